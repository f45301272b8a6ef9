//! Reusable platform hooks and the per-platform hooks catalog

use async_trait::async_trait;
use crosspost_domain::{
    AdapterDefinition, ExecutionContext, HookError, HookKind, NoHooks, PartValue, PlatformHooks,
    RequestBody,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `prepare_body` hook that drops empty collections from request bodies
///
/// Several platforms reject `tags=[]` or `"categories": {}` outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropEmptyCollections;

fn is_empty_collection_text(value: &str) -> bool {
    matches!(value.trim(), "[]" | "{}")
}

fn is_empty_collection(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn prune(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.values_mut().for_each(prune);
            map.retain(|_, v| !is_empty_collection(v));
        }
        Value::Array(items) => items.iter_mut().for_each(prune),
        _ => {}
    }
}

#[async_trait]
impl PlatformHooks for DropEmptyCollections {
    fn provides(&self, hook: HookKind) -> bool {
        hook == HookKind::PrepareBody
    }

    async fn prepare_body(
        &self,
        _url: &str,
        body: &mut RequestBody,
        _ctx: &ExecutionContext,
    ) -> Result<(), HookError> {
        match body {
            RequestBody::Json(value) => prune(value),
            RequestBody::Form(fields) => fields.retain(|(_, v)| !is_empty_collection_text(v)),
            RequestBody::Multipart(parts) => parts.retain(|(_, part)| match part {
                PartValue::Text(text) => !is_empty_collection_text(text),
                PartValue::Blob(_) => true,
            }),
            RequestBody::Empty => {}
        }
        Ok(())
    }
}

/// Per-platform hook implementations, resolved by platform id
///
/// Platforms without a dedicated entry get [`DropEmptyCollections`] when they
/// only declare `prepare_body`, and [`NoHooks`] otherwise.
#[derive(Default)]
pub struct HooksCatalog {
    by_platform: BTreeMap<String, Arc<dyn PlatformHooks>>,
}

impl HooksCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with(mut self, platform_id: impl Into<String>, hooks: Arc<dyn PlatformHooks>) -> Self {
        self.by_platform.insert(platform_id.into(), hooks);
        self
    }

    pub fn resolve(&self, definition: &AdapterDefinition) -> Arc<dyn PlatformHooks> {
        if let Some(hooks) = self.by_platform.get(&definition.id) {
            return Arc::clone(hooks);
        }
        if !definition.hooks.is_empty()
            && definition.hooks.iter().all(|h| DropEmptyCollections.provides(*h))
        {
            return Arc::new(DropEmptyCollections);
        }
        Arc::new(NoHooks)
    }
}
