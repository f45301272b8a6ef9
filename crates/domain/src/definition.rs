//! Adapter definitions: the declarative description of a platform's publish protocol
//!
//! Definitions arrive as [`AdapterSpec`] documents (deserialized from YAML or
//! JSON by an adapter) and become [`AdapterDefinition`] only after
//! validation. Every expression is compiled here, so a definition that loads
//! can never fail on an expression at publish time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::expr::{ExpressionError, Expr};
use crate::model::{Capability, ContentFormat};

static ID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z0-9_\-]+$").expect("Valid regex"));

/// Well-known endpoint names driven by the publish workflow
pub mod endpoint_names {
    pub const CREATE_DRAFT: &str = "create_draft";
    pub const UPDATE_DRAFT: &str = "update_draft";
    pub const PUBLISH: &str = "publish";
    pub const UPLOAD_IMAGE: &str = "upload_image";
}

/// Errors raised while loading or validating a definition
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Invalid definition '{id}': field `{field}` {message}")]
    Invalid {
        id: String,
        field: String,
        message: String,
    },
    #[error("Invalid expression in '{id}' at `{field}`: {source}")]
    Expression {
        id: String,
        field: String,
        #[source]
        source: ExpressionError,
    },
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Duplicate platform id '{id}' in files: {files:?}")]
    DuplicateId { id: String, files: Vec<String> },
    #[error("Definition '{id}' declares hook `{hook}` but no implementation provides it")]
    MissingHook { id: String, hook: HookKind },
}

impl DefinitionError {
    fn invalid(id: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        DefinitionError::Invalid {
            id: id.to_string(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// HTTP verbs a definition may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this verb carry a body
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("must be one of GET, POST, PUT, PATCH, DELETE (got '{other}')")),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    #[default]
    Json,
    Form,
    Multipart,
}

impl FromStr for BodyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "json" => Ok(BodyEncoding::Json),
            "form" => Ok(BodyEncoding::Form),
            "multipart" => Ok(BodyEncoding::Multipart),
            other => Err(format!("must be one of json, form, multipart (got '{other}')")),
        }
    }
}

/// Named hooks a definition can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    ContentTransform,
    PrepareBody,
    BeforeRequest,
    ProcessImages,
    UploadImageByUrl,
}

impl HookKind {
    pub const ALL: [HookKind; 5] = [
        HookKind::ContentTransform,
        HookKind::PrepareBody,
        HookKind::BeforeRequest,
        HookKind::ProcessImages,
        HookKind::UploadImageByUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::ContentTransform => "content_transform",
            HookKind::PrepareBody => "prepare_body",
            HookKind::BeforeRequest => "before_request",
            HookKind::ProcessImages => "process_images",
            HookKind::UploadImageByUrl => "upload_image_by_url",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.as_str() == value)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Unvalidated adapter definition document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "displayName")]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, alias = "contentFormat")]
    pub content_format: Option<String>,
    #[serde(default, alias = "authCheck")]
    pub auth: Option<EndpointSpec>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointSpec>,
    #[serde(default, alias = "draftUrlTemplate")]
    pub draft_url: Option<String>,
    #[serde(default, alias = "postUrlTemplate")]
    pub post_url: Option<String>,
    #[serde(default, alias = "requestDelayMs")]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// Unvalidated endpoint document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default, alias = "acceptStatus")]
    pub accept_status: Vec<u16>,
    #[serde(default)]
    pub response: ResponseSpec,
}

/// Unvalidated response contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(default, alias = "successExpr")]
    pub success: Option<String>,
    #[serde(default, alias = "errorExpr")]
    pub error: Option<String>,
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Validated form
// ---------------------------------------------------------------------------

/// Compiled response contract
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContract {
    pub success: Option<Expr>,
    pub error: Option<Expr>,
    pub extract: BTreeMap<String, Expr>,
}

/// One validated HTTP step
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDefinition {
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub encoding: BodyEncoding,
    pub body: Option<Value>,
    /// Statuses treated as transport success in addition to 2xx
    pub accept_status: BTreeSet<u16>,
    pub response: ResponseContract,
}

impl EndpointDefinition {
    pub fn accepts_status(&self, status: u16) -> bool {
        (200..300).contains(&status) || self.accept_status.contains(&status)
    }

    fn from_spec(id: &str, name: &str, spec: EndpointSpec) -> Result<Self, DefinitionError> {
        let field = |suffix: &str| format!("{name}.{suffix}");

        if spec.url.trim().is_empty() {
            return Err(DefinitionError::invalid(id, field("url"), "is required"));
        }

        let method = match spec.method.as_deref() {
            None => HttpMethod::Get,
            Some(raw) => raw
                .parse::<HttpMethod>()
                .map_err(|message| DefinitionError::invalid(id, field("method"), message))?,
        };

        let encoding = match spec.content_type.as_deref() {
            None => BodyEncoding::Json,
            Some(raw) => raw
                .parse::<BodyEncoding>()
                .map_err(|message| DefinitionError::invalid(id, field("content_type"), message))?,
        };

        if let Some(body) = &spec.body {
            if encoding != BodyEncoding::Json && !body.is_object() {
                return Err(DefinitionError::invalid(
                    id,
                    field("body"),
                    "must be an object for form and multipart encodings",
                ));
            }
        }

        if let Some(bad) = spec.accept_status.iter().find(|s| !(100..=599).contains(*s)) {
            return Err(DefinitionError::invalid(
                id,
                field("accept_status"),
                format!("contains invalid status code {bad}"),
            ));
        }

        let compile = |raw: &str, at: String| {
            Expr::parse(raw).map_err(|source| DefinitionError::Expression {
                id: id.to_string(),
                field: at,
                source,
            })
        };

        let success = spec
            .response
            .success
            .as_deref()
            .map(|raw| compile(raw, field("response.success")))
            .transpose()?;
        let error = spec
            .response
            .error
            .as_deref()
            .map(|raw| compile(raw, field("response.error")))
            .transpose()?;
        let extract = spec
            .response
            .extract
            .iter()
            .map(|(key, raw)| {
                compile(raw, field(&format!("response.extract.{key}"))).map(|e| (key.clone(), e))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            url: spec.url,
            method,
            headers: spec.headers,
            encoding,
            body: spec.body,
            accept_status: spec.accept_status.into_iter().collect(),
            response: ResponseContract {
                success,
                error,
                extract,
            },
        })
    }
}

/// A validated, immutable platform definition
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterDefinition {
    pub id: String,
    pub display_name: String,
    pub icon: Option<String>,
    pub homepage: Url,
    pub capabilities: BTreeSet<Capability>,
    pub content_format: ContentFormat,
    pub auth_check: EndpointDefinition,
    pub endpoints: BTreeMap<String, EndpointDefinition>,
    pub draft_url_template: Option<String>,
    pub post_url_template: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub hooks: BTreeSet<HookKind>,
}

impl AdapterDefinition {
    /// Endpoint by name; absence means the step is not supported
    pub fn endpoint(&self, name: &str) -> Option<&EndpointDefinition> {
        self.endpoints.get(name)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn declares_hook(&self, hook: HookKind) -> bool {
        self.hooks.contains(&hook)
    }
}

impl TryFrom<AdapterSpec> for AdapterDefinition {
    type Error = DefinitionError;

    fn try_from(spec: AdapterSpec) -> Result<Self, Self::Error> {
        let id = spec.id.trim().to_string();
        if id.is_empty() {
            return Err(DefinitionError::invalid("<unknown>", "id", "is required"));
        }
        if !ID_PATTERN.is_match(&id) {
            return Err(DefinitionError::invalid(&id, "id", "must match [a-z0-9_-]+"));
        }

        let display_name = spec.name.trim().to_string();
        if display_name.is_empty() {
            return Err(DefinitionError::invalid(&id, "name", "is required"));
        }

        let homepage = parse_web_url(&spec.homepage)
            .map_err(|message| DefinitionError::invalid(&id, "homepage", message))?;

        if let Some(icon) = spec.icon.as_deref() {
            parse_web_url(icon).map_err(|message| DefinitionError::invalid(&id, "icon", message))?;
        }

        let mut capabilities = BTreeSet::new();
        for raw in &spec.capabilities {
            let capability = Capability::parse(raw.trim()).ok_or_else(|| {
                DefinitionError::invalid(&id, "capabilities", format!("unknown capability '{raw}'"))
            })?;
            capabilities.insert(capability);
        }

        let content_format = match spec.content_format.as_deref().map(str::trim) {
            None | Some("html") => ContentFormat::Html,
            Some("markdown") => ContentFormat::Markdown,
            Some(other) => {
                return Err(DefinitionError::invalid(
                    &id,
                    "content_format",
                    format!("must be html or markdown (got '{other}')"),
                ));
            }
        };

        let mut hooks = BTreeSet::new();
        for raw in &spec.hooks {
            let hook = HookKind::parse(raw.trim()).ok_or_else(|| {
                DefinitionError::invalid(&id, "hooks", format!("unknown hook '{raw}'"))
            })?;
            hooks.insert(hook);
        }

        let auth_spec = spec
            .auth
            .ok_or_else(|| DefinitionError::invalid(&id, "auth", "is required"))?;
        let auth_check = EndpointDefinition::from_spec(&id, "auth", auth_spec)?;

        let endpoints = spec
            .endpoints
            .into_iter()
            .map(|(name, endpoint)| {
                let field = format!("endpoints.{name}");
                EndpointDefinition::from_spec(&id, &field, endpoint).map(|mut e| {
                    e.name = name.clone();
                    (name, e)
                })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self {
            id,
            display_name,
            icon: spec.icon,
            homepage,
            capabilities,
            content_format,
            auth_check,
            endpoints,
            draft_url_template: spec.draft_url.filter(|t| !t.trim().is_empty()),
            post_url_template: spec.post_url.filter(|t| !t.trim().is_empty()),
            request_delay_ms: spec.request_delay_ms,
            hooks,
        })
    }
}

fn parse_web_url(raw: &str) -> Result<Url, String> {
    if raw.trim().is_empty() {
        return Err("is required".to_string());
    }
    let url = Url::parse(raw.trim()).map_err(|e| format!("is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(format!("must be an http(s) URL (got '{raw}')")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_spec() -> AdapterSpec {
        serde_json::from_value(json!({
            "id": "demo",
            "displayName": "Demo",
            "homepage": "https://demo.test",
            "capabilities": ["article", "draft", "cover"],
            "authCheck": {
                "url": "https://demo.test/api/me",
                "response": {
                    "successExpr": "$.logged_in == true",
                    "extract": { "uid": "$.user.id" }
                }
            },
            "endpoints": {
                "create_draft": {
                    "url": "https://demo.test/api/drafts",
                    "method": "post",
                    "contentType": "form",
                    "body": { "title": "{{article.title}}" },
                    "accept_status": [400],
                    "response": { "extract": { "draft_id": "$.data.id" } }
                }
            },
            "draftUrlTemplate": "https://demo.test/edit/{{draft_id}}",
            "hooks": ["prepare_body"]
        }))
        .unwrap()
    }

    fn field_of(err: DefinitionError) -> String {
        match err {
            DefinitionError::Invalid { field, .. } | DefinitionError::Expression { field, .. } => {
                field
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_definition_compiles() {
        let def = AdapterDefinition::try_from(valid_spec()).unwrap();

        assert_eq!(def.id, "demo");
        assert_eq!(def.display_name, "Demo");
        assert!(def.supports(Capability::Cover));
        assert!(def.declares_hook(HookKind::PrepareBody));
        assert_eq!(def.auth_check.method, HttpMethod::Get);

        let create = def.endpoint("create_draft").unwrap();
        assert_eq!(create.name, "create_draft");
        assert_eq!(create.method, HttpMethod::Post);
        assert_eq!(create.encoding, BodyEncoding::Form);
        assert!(create.accepts_status(400));
        assert!(create.accepts_status(201));
        assert!(!create.accepts_status(401));
        assert!(def.endpoint("publish").is_none());
    }

    #[test]
    fn test_missing_auth_is_rejected() {
        let mut spec = valid_spec();
        spec.auth = None;
        let err = AdapterDefinition::try_from(spec).unwrap_err();
        assert_eq!(field_of(err), "auth");
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        let mut spec = valid_spec();
        spec.capabilities.push("video".to_string());
        let err = AdapterDefinition::try_from(spec).unwrap_err();
        assert_eq!(field_of(err), "capabilities");
    }

    #[test]
    fn test_bad_method_is_rejected() {
        let mut spec = valid_spec();
        spec.endpoints.get_mut("create_draft").unwrap().method = Some("FETCH".to_string());
        let err = AdapterDefinition::try_from(spec).unwrap_err();
        assert_eq!(field_of(err), "endpoints.create_draft.method");
    }

    #[test]
    fn test_bad_homepage_is_rejected() {
        for homepage in ["", "not a url", "ftp://demo.test"] {
            let mut spec = valid_spec();
            spec.homepage = homepage.to_string();
            let err = AdapterDefinition::try_from(spec).unwrap_err();
            assert_eq!(field_of(err), "homepage");
        }
    }

    #[test]
    fn test_invalid_expression_is_rejected_at_load_time() {
        let mut spec = valid_spec();
        spec.auth.as_mut().unwrap().response.success = Some("$.a > 1".to_string());
        let err = AdapterDefinition::try_from(spec).unwrap_err();
        assert!(matches!(err, DefinitionError::Expression { .. }));
        assert_eq!(field_of(err), "auth.response.success");
    }

    #[test]
    fn test_form_body_must_be_object() {
        let mut spec = valid_spec();
        spec.endpoints.get_mut("create_draft").unwrap().body = Some(json!(["x"]));
        let err = AdapterDefinition::try_from(spec).unwrap_err();
        assert_eq!(field_of(err), "endpoints.create_draft.body");
    }

    #[test]
    fn test_unknown_hook_and_bad_id_are_rejected() {
        let mut spec = valid_spec();
        spec.hooks.push("sign_request".to_string());
        assert_eq!(field_of(AdapterDefinition::try_from(spec).unwrap_err()), "hooks");

        let mut spec = valid_spec();
        spec.id = "Demo Site".to_string();
        assert_eq!(field_of(AdapterDefinition::try_from(spec).unwrap_err()), "id");
    }
}
