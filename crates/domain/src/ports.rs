//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::context::{Blob, ExecutionContext};
use crate::definition::{AdapterDefinition, DefinitionError, HookKind, HttpMethod};
use crate::runtime::AdapterRuntime;

/// A field of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    Blob(Blob),
}

/// Encoded request body
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, PartValue)>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// A fully built HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
        }
    }
}

/// Raw HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Error type for transport operations
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
}

/// Port for sending HTTP requests with the user's platform session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request; only network-level failures are errors here
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).fetch(request).await
    }
}

/// Error raised by a platform hook
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-platform custom code, resolved by name from the definition
///
/// Implementations are sparse: `provides` reports which hooks exist, and
/// the runtime only calls hooks that are both declared and provided.
#[async_trait]
pub trait PlatformHooks: Send + Sync {
    fn provides(&self, hook: HookKind) -> bool;

    /// Rewrite article content before format conversion
    async fn content_transform(
        &self,
        content: String,
        _ctx: &ExecutionContext,
    ) -> Result<String, HookError> {
        Ok(content)
    }

    /// Rewrite an encoded body in place
    async fn prepare_body(
        &self,
        _url: &str,
        _body: &mut RequestBody,
        _ctx: &ExecutionContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Dynamic headers merged over the static ones
    async fn before_request(
        &self,
        _url: &str,
        _ctx: &ExecutionContext,
    ) -> Result<BTreeMap<String, String>, HookError> {
        Ok(BTreeMap::new())
    }

    /// Replace embedded image references with platform-hosted URLs
    async fn process_images(
        &self,
        content: String,
        _ctx: &ExecutionContext,
        _transport: &dyn Transport,
    ) -> Result<String, HookError> {
        Ok(content)
    }

    /// Upload one remote image, returning its platform-hosted URL
    async fn upload_image_by_url(
        &self,
        _src: &str,
        _ctx: &ExecutionContext,
        _transport: &dyn Transport,
    ) -> Result<String, HookError> {
        Err(HookError::new("upload_image_by_url is not implemented"))
    }
}

/// Hooks implementation for platforms that need none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl PlatformHooks for NoHooks {
    fn provides(&self, _hook: HookKind) -> bool {
        false
    }
}

/// Port for content sanitation and format conversion
pub trait ContentProcessor: Send + Sync {
    /// Generic HTML clean-up applied before platform-specific steps
    fn preprocess(&self, html: &str) -> String;

    fn markdown_to_html(&self, markdown: &str) -> String;

    fn html_to_markdown(&self, html: &str) -> String;
}

/// Port for loading adapter definitions
#[async_trait]
pub trait DefinitionsRepo: Send + Sync {
    /// Load every definition, one result per source document
    async fn load_all(&self) -> Vec<Result<AdapterDefinition, DefinitionError>>;

    /// Load valid definitions, logging and skipping invalid ones
    async fn load(&self) -> Vec<AdapterDefinition> {
        self.load_all()
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(definition) => Some(definition),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping invalid adapter definition");
                    None
                }
            })
            .collect()
    }
}

/// Error type for registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Platform already registered: {0}")]
    DuplicatePlatform(String),
}

/// Port for the platform id -> runtime lookup
pub trait PlatformRegistry: Send + Sync {
    fn register(&self, runtime: AdapterRuntime) -> Result<(), RegistryError>;

    /// Remove a platform, returning whether it was present
    fn unregister(&self, platform_id: &str) -> bool;

    fn get(&self, platform_id: &str) -> Option<Arc<AdapterRuntime>>;

    fn list_registered_ids(&self) -> Vec<String>;
}
