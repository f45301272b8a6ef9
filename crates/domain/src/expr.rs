//! Template interpolation and field-path expressions
//!
//! Expressions are compiled once when a definition is validated and are
//! total at run time: evaluation never fails, absent values are `None`.

use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("Valid regex"));

static COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^\s=!]+)\s*(==|!=)\s*(.+?)\s*$").expect("Valid regex"));

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("Valid regex"));

/// Errors raised while compiling an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),
    #[error("unsupported expression '{0}'")]
    Unsupported(String),
}

/// Dotted path into a nested JSON value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse `$.a.b`, `a.b` or `a[0].b`
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        if body.is_empty() {
            // `$` alone addresses the whole document
            if trimmed == "$" {
                return Ok(Self { segments: vec![] });
            }
            return Err(ExpressionError::InvalidPath(raw.to_string()));
        }

        let normalized = body.replace('[', ".").replace(']', "");
        let segments: Vec<String> = normalized.split('.').map(str::to_string).collect();

        if segments.iter().any(|s| !SEGMENT.is_match(s)) {
            return Err(ExpressionError::InvalidPath(raw.to_string()));
        }

        Ok(Self { segments })
    }

    /// Resolve against `data`, returning `None` if any segment is missing
    pub fn resolve<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        let mut current = data;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$.{}", self.segments.join("."))
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let raw = raw.trim();
        match raw {
            "null" => return Ok(Literal::Null),
            "undefined" => return Ok(Literal::Undefined),
            "true" => return Ok(Literal::Bool(true)),
            "false" => return Ok(Literal::Bool(false)),
            _ => {}
        }

        for quote in ['"', '\''] {
            if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
                return Ok(Literal::Str(raw[1..raw.len() - 1].to_string()));
            }
        }

        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Literal::Int(int));
        }
        if let Ok(float) = raw.parse::<f64>() {
            if float.is_finite() {
                return Ok(Literal::Float(float));
            }
        }

        Err(ExpressionError::InvalidLiteral(raw.to_string()))
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Literal::Null | Literal::Undefined, None | Some(Value::Null)) => true,
            (Literal::Bool(expected), Some(Value::Bool(actual))) => expected == actual,
            (Literal::Int(expected), Some(Value::Number(actual))) => match actual.as_i64() {
                Some(actual) => actual == *expected,
                None => actual.as_f64() == Some(*expected as f64),
            },
            (Literal::Float(expected), Some(Value::Number(actual))) => {
                actual.as_f64() == Some(*expected)
            }
            (Literal::Str(expected), Some(Value::String(actual))) => expected == actual,
            _ => false,
        }
    }
}

/// Compiled expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(FieldPath),
    Equals(FieldPath, Literal),
    NotEquals(FieldPath, Literal),
}

impl Expr {
    /// Compile an expression string
    pub fn parse(raw: &str) -> Result<Self, ExpressionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExpressionError::Empty);
        }

        if let Some(captures) = COMPARISON.captures(trimmed) {
            let path = FieldPath::parse(&captures[1])?;
            let literal = Literal::parse(&captures[3])?;
            return Ok(match &captures[2] {
                "==" => Expr::Equals(path, literal),
                _ => Expr::NotEquals(path, literal),
            });
        }

        if trimmed.contains(char::is_whitespace)
            || trimmed.contains(['=', '!', '<', '>', '&', '|', '(', ')'])
        {
            return Err(ExpressionError::Unsupported(trimmed.to_string()));
        }

        Ok(Expr::Field(FieldPath::parse(trimmed)?))
    }

    /// Evaluate against `data`; comparisons yield a boolean
    pub fn evaluate(&self, data: &Value) -> Option<Value> {
        match self {
            Expr::Field(path) => path.resolve(data).cloned(),
            Expr::Equals(path, literal) => Some(Value::Bool(literal.matches(path.resolve(data)))),
            Expr::NotEquals(path, literal) => {
                Some(Value::Bool(!literal.matches(path.resolve(data))))
            }
        }
    }

    /// Evaluate as a predicate
    pub fn test(&self, data: &Value) -> bool {
        is_truthy(self.evaluate(data).as_ref())
    }
}

/// Loose truthiness: absent, null, false, 0 and "" are false
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Render a value the way it appears inside a template
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replace every `{{path}}` with the stringified value found in `context`
///
/// Unresolved or malformed paths render as the empty string.
pub fn interpolate(template: &str, context: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures<'_>| {
            FieldPath::parse(&captures[1])
                .ok()
                .map(|path| stringify(path.resolve(context)))
                .unwrap_or_default()
        })
        .into_owned()
}

/// If `template` is exactly one placeholder, return its path
pub fn sole_placeholder(template: &str) -> Option<FieldPath> {
    let captures = PLACEHOLDER.captures(template.trim())?;
    let whole = captures.get(0)?;
    if whole.as_str().len() != template.trim().len() {
        return None;
    }
    FieldPath::parse(&captures[1]).ok()
}

/// Interpolate every string leaf of a JSON template
///
/// A leaf that is a single placeholder keeps the resolved value's type.
pub fn interpolate_value(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(s) => match sole_placeholder(s) {
            Some(path) => match path.resolve(context) {
                Some(Value::Null) | None => Value::String(String::new()),
                Some(value) => value.clone(),
            },
            None => Value::String(interpolate(s, context)),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}
