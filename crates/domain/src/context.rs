//! Per-run execution context

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::expr::FieldPath;
use crate::model::Article;

/// Opaque binary payload (an image being uploaded, for instance)
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

/// Mutable state for exactly one workflow run
///
/// Seeded with `{ article }` and grown with extracted fields as steps
/// complete. A fresh context is built for every publish attempt.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    data: Value,
    blobs: HashMap<String, Blob>,
}

impl ExecutionContext {
    pub fn new(article: &Article) -> Self {
        let mut root = Map::new();
        root.insert(
            "article".to_string(),
            serde_json::to_value(article).unwrap_or(Value::Null),
        );
        Self {
            data: Value::Object(root),
            blobs: HashMap::new(),
        }
    }

    /// The whole context as a JSON document, for templating
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        FieldPath::parse(path).ok()?.resolve(&self.data)
    }

    /// String value at `path`, with numbers rendered as text
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.data {
            map.insert(key.into(), value);
        }
    }

    /// Set a field on the article object
    pub fn set_article_field(&mut self, key: &str, value: Value) {
        if let Some(Value::Object(article)) = self.data.get_mut("article") {
            article.insert(key.to_string(), value);
        }
    }

    /// Merge step outputs into the top level
    pub fn merge(&mut self, outputs: &Map<String, Value>) {
        for (key, value) in outputs {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn set_blob(&mut self, name: impl Into<String>, blob: Blob) {
        self.blobs.insert(name.into(), blob);
    }

    pub fn remove_blob(&mut self, name: &str) -> Option<Blob> {
        self.blobs.remove(name)
    }

    /// Blob bound to the first segment of `path`
    pub fn blob_for(&self, path: &FieldPath) -> Option<&Blob> {
        match path.segments() {
            [name] => self.blobs.get(name),
            _ => None,
        }
    }
}
