//! Fakes shared by the domain unit tests

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::definition::{AdapterDefinition, AdapterSpec, HookKind};
use crate::ports::{
    ContentProcessor, HookError, HttpRequest, HttpResponse, PlatformHooks, PlatformRegistry,
    RegistryError, RequestBody, Transport, TransportError,
};
use crate::runtime::AdapterRuntime;

enum Reply {
    Response(HttpResponse),
    Error(TransportError),
}

struct Rule {
    url_contains: String,
    reply: Reply,
    delay: Option<Duration>,
    /// Rule stops matching after this many uses
    remaining: Option<AtomicUsize>,
}

impl Rule {
    fn new(url_contains: &str, reply: Reply) -> Self {
        Self {
            url_contains: url_contains.to_string(),
            reply,
            delay: None,
            remaining: None,
        }
    }

    fn take(&self, url: &str) -> bool {
        if !url.contains(&self.url_contains) {
            return false;
        }
        match &self.remaining {
            None => true,
            Some(left) => left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        }
    }
}

/// Scripted transport: first rule whose substring matches the URL wins,
/// anything else gets `200 {}`
pub struct FakeTransport {
    rules: Vec<Rule>,
    log: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            rules: vec![],
            log: Mutex::new(vec![]),
        }
    }

    pub fn respond(mut self, url_contains: &str, response: HttpResponse) -> Self {
        self.rules
            .push(Rule::new(url_contains, Reply::Response(response)));
        self
    }

    pub fn respond_after(
        mut self,
        url_contains: &str,
        delay: Duration,
        response: HttpResponse,
    ) -> Self {
        self.rules.push(Rule {
            delay: Some(delay),
            ..Rule::new(url_contains, Reply::Response(response))
        });
        self
    }

    pub fn fail(mut self, url_contains: &str, error: TransportError) -> Self {
        self.rules.push(Rule::new(url_contains, Reply::Error(error)));
        self
    }

    /// Fail the first `times` matching requests, then fall through
    pub fn fail_times(mut self, url_contains: &str, times: usize, error: TransportError) -> Self {
        self.rules.push(Rule {
            remaining: Some(AtomicUsize::new(times)),
            ..Rule::new(url_contains, Reply::Error(error))
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());

        let Some(rule) = self.rules.iter().find(|rule| rule.take(&request.url)) else {
            return Ok(HttpResponse::json(200, &json!({})));
        };

        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }

        match &rule.reply {
            Reply::Response(response) => Ok(response.clone()),
            Reply::Error(error) => Err(error.clone()),
        }
    }
}

/// Hooks with canned behaviour
#[derive(Default)]
pub struct FakeHooks {
    headers: Option<BTreeMap<String, String>>,
    body: Option<RequestBody>,
    suffix: Option<String>,
    upload: Option<Result<String, String>>,
}

impl FakeHooks {
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body_rewrite(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// content_transform appends `suffix`
    pub fn with_content_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    pub fn with_upload(mut self, result: Result<&str, &str>) -> Self {
        self.upload = Some(result.map(str::to_string).map_err(str::to_string));
        self
    }
}

#[async_trait]
impl PlatformHooks for FakeHooks {
    fn provides(&self, hook: HookKind) -> bool {
        match hook {
            HookKind::BeforeRequest => self.headers.is_some(),
            HookKind::PrepareBody => self.body.is_some(),
            HookKind::ContentTransform => self.suffix.is_some(),
            HookKind::UploadImageByUrl => self.upload.is_some(),
            HookKind::ProcessImages => false,
        }
    }

    async fn content_transform(
        &self,
        content: String,
        _ctx: &ExecutionContext,
    ) -> Result<String, HookError> {
        Ok(format!("{}{}", content, self.suffix.as_deref().unwrap_or_default()))
    }

    async fn prepare_body(
        &self,
        _url: &str,
        body: &mut RequestBody,
        _ctx: &ExecutionContext,
    ) -> Result<(), HookError> {
        if let Some(rewrite) = &self.body {
            *body = rewrite.clone();
        }
        Ok(())
    }

    async fn before_request(
        &self,
        _url: &str,
        _ctx: &ExecutionContext,
    ) -> Result<BTreeMap<String, String>, HookError> {
        Ok(self.headers.clone().unwrap_or_default())
    }

    async fn upload_image_by_url(
        &self,
        _src: &str,
        _ctx: &ExecutionContext,
        _transport: &dyn Transport,
    ) -> Result<String, HookError> {
        match &self.upload {
            Some(Ok(url)) => Ok(url.clone()),
            Some(Err(message)) => Err(HookError::new(message.clone())),
            None => Err(HookError::new("no upload configured")),
        }
    }
}

/// Content processor that tags conversions so tests can see them
pub struct FakeContent;

impl ContentProcessor for FakeContent {
    fn preprocess(&self, html: &str) -> String {
        html.trim().to_string()
    }

    fn markdown_to_html(&self, markdown: &str) -> String {
        format!("<p>{}</p>", markdown)
    }

    fn html_to_markdown(&self, html: &str) -> String {
        html.replace("<p>", "").replace("</p>", "")
    }
}

/// Build a definition from a JSON document, panicking on validation errors
pub fn definition(value: serde_json::Value) -> AdapterDefinition {
    let spec: AdapterSpec = serde_json::from_value(value).unwrap();
    AdapterDefinition::try_from(spec).unwrap()
}

/// Minimal registry for orchestrator tests
#[derive(Default)]
pub struct TestRegistry {
    runtimes: Mutex<BTreeMap<String, Arc<AdapterRuntime>>>,
}

impl PlatformRegistry for TestRegistry {
    fn register(&self, runtime: AdapterRuntime) -> Result<(), RegistryError> {
        let mut runtimes = self.runtimes.lock().unwrap();
        if runtimes.contains_key(runtime.id()) {
            return Err(RegistryError::DuplicatePlatform(runtime.id().to_string()));
        }
        runtimes.insert(runtime.id().to_string(), Arc::new(runtime));
        Ok(())
    }

    fn unregister(&self, platform_id: &str) -> bool {
        self.runtimes.lock().unwrap().remove(platform_id).is_some()
    }

    fn get(&self, platform_id: &str) -> Option<Arc<AdapterRuntime>> {
        self.runtimes.lock().unwrap().get(platform_id).cloned()
    }

    fn list_registered_ids(&self) -> Vec<String> {
        self.runtimes.lock().unwrap().keys().cloned().collect()
    }
}
