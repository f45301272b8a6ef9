//! Adapter runtime: the per-platform publish workflow
//!
//! `Idle -> CheckingAuth -> Transforming -> CreatingDraft -> UpdatingDraft
//! -> (Publishing | DraftOnly) -> Done`, with `Failed` reachable from any
//! state. Steps are strictly sequential; cancellation is observed on every
//! transition.

use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use regex::Regex;

use crate::context::{Blob, ExecutionContext};
use crate::definition::{
    AdapterDefinition, DefinitionError, HookKind, endpoint_names,
};
use crate::executor::{EndpointExecutor, ExecuteError};
use crate::expr::{interpolate, stringify};
use crate::model::{Article, Capability, ContentFormat, SyncResult};
use crate::ports::{ContentProcessor, HttpRequest, PlatformHooks, Transport, TransportError};

static HTML_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("Valid regex")
});

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(\s*<?([^)\s>]+)>?").expect("Valid regex"));

/// Workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    CheckingAuth,
    Transforming,
    CreatingDraft,
    UpdatingDraft,
    Publishing,
    DraftOnly,
    Done,
    Failed,
}

/// Errors that end a workflow run
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),
    #[error("Transport error: {0}")]
    Transport(ExecuteError),
    #[error("{0}")]
    Rejected(ExecuteError),
    #[error("Hook failed: {0}")]
    Hook(String),
    #[error("Image upload failed: {0}")]
    ImageUpload(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Only transport failures are worth retrying automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Transport(_))
    }
}

impl From<ExecuteError> for WorkflowError {
    fn from(error: ExecuteError) -> Self {
        match error {
            ExecuteError::Transport { .. } => WorkflowError::Transport(error),
            ExecuteError::Rejected { .. } => WorkflowError::Rejected(error),
            ExecuteError::Hook { .. } => WorkflowError::Hook(error.to_string()),
        }
    }
}

/// Caller options for one publish attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Stop after saving the draft
    pub draft_only: bool,
}

/// Successful end of a workflow run
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    pub draft_only: bool,
}

impl PublishOutcome {
    pub fn into_result(self, platform: &str) -> SyncResult {
        if self.draft_only {
            SyncResult::draft(platform, self.post_id, self.post_url)
        } else {
            SyncResult::published(platform, self.post_id, self.post_url)
        }
    }
}

/// Result of an authentication probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthInfo {
    pub authenticated: bool,
    /// Fields extracted by the auth endpoint (user id, name, ...)
    pub fields: Map<String, Value>,
    /// Why the probe failed, when it did
    pub reason: Option<String>,
}

/// Tracks the current state and enforces cancellation between steps
struct Progress<'a> {
    platform: &'a str,
    state: WorkflowState,
    cancel: &'a CancellationToken,
}

impl<'a> Progress<'a> {
    fn new(platform: &'a str, cancel: &'a CancellationToken) -> Self {
        Self {
            platform,
            state: WorkflowState::Idle,
            cancel,
        }
    }

    fn advance(&mut self, next: WorkflowState) -> Result<(), WorkflowError> {
        if self.cancel.is_cancelled() {
            tracing::info!(platform = %self.platform, state = ?self.state, "Cancellation observed");
            return Err(WorkflowError::Cancelled);
        }
        tracing::debug!(platform = %self.platform, from = ?self.state, to = ?next, "Workflow transition");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, error: &WorkflowError) {
        tracing::debug!(
            platform = %self.platform,
            from = ?self.state,
            to = ?WorkflowState::Failed,
            error = %error,
            "Workflow transition"
        );
        self.state = WorkflowState::Failed;
    }
}

/// A platform definition bound to a transport, hooks and content processing
pub struct AdapterRuntime {
    definition: Arc<AdapterDefinition>,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn PlatformHooks>,
    content: Arc<dyn ContentProcessor>,
    enabled_hooks: BTreeSet<HookKind>,
}

impl std::fmt::Debug for AdapterRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRuntime")
            .field("platform", &self.definition.id)
            .field("hooks", &self.enabled_hooks)
            .finish()
    }
}

impl AdapterRuntime {
    /// Bind a definition; every declared hook must be provided
    pub fn new(
        definition: impl Into<Arc<AdapterDefinition>>,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn PlatformHooks>,
        content: Arc<dyn ContentProcessor>,
    ) -> Result<Self, DefinitionError> {
        let definition = definition.into();

        if let Some(missing) = definition.hooks.iter().find(|h| !hooks.provides(**h)) {
            return Err(DefinitionError::MissingHook {
                id: definition.id.clone(),
                hook: *missing,
            });
        }

        let enabled_hooks = definition.hooks.clone();
        Ok(Self {
            definition,
            transport,
            hooks,
            content,
            enabled_hooks,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &AdapterDefinition {
        &self.definition
    }

    fn hook_enabled(&self, hook: HookKind) -> bool {
        self.enabled_hooks.contains(&hook)
    }

    fn executor(&self) -> EndpointExecutor<'_> {
        EndpointExecutor::new(&self.definition, self.transport.as_ref(), self.hooks.as_ref())
    }

    /// Run only the authentication probe
    ///
    /// A rejected or unreachable auth endpoint yields `authenticated: false`;
    /// only hook failures are errors.
    pub async fn check_auth(&self) -> Result<AuthInfo, WorkflowError> {
        let mut ctx = ExecutionContext::new(&Article::default());
        match self.authenticate(&self.executor(), &mut ctx).await {
            Ok(fields) => Ok(AuthInfo {
                authenticated: true,
                fields,
                reason: None,
            }),
            Err(WorkflowError::NotAuthenticated(reason)) => Ok(AuthInfo {
                authenticated: false,
                fields: Map::new(),
                reason: Some(reason),
            }),
            Err(error) => Err(error),
        }
    }

    /// Run the workflow and convert every outcome into a [`SyncResult`]
    pub async fn publish(
        &self,
        article: &Article,
        options: PublishOptions,
        cancel: &CancellationToken,
    ) -> SyncResult {
        match self.run(article, options, cancel).await {
            Ok(outcome) => outcome.into_result(self.id()),
            Err(error) => SyncResult::failed(self.id(), error.to_string()),
        }
    }

    /// Run the workflow once with a fresh context
    ///
    /// Panics inside hooks or collaborators are converted into
    /// [`WorkflowError::Internal`].
    pub async fn run(
        &self,
        article: &Article,
        options: PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome, WorkflowError> {
        match AssertUnwindSafe(self.run_workflow(article, options, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "workflow panicked".to_string());
                tracing::error!(platform = %self.id(), error = %message, "Workflow panicked");
                Err(WorkflowError::Internal(message))
            }
        }
    }

    async fn run_workflow(
        &self,
        article: &Article,
        options: PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome, WorkflowError> {
        let mut progress = Progress::new(self.id(), cancel);
        let result = self.drive(article, options, &mut progress).await;
        if let Err(error) = &result {
            progress.fail(error);
        }
        result
    }

    async fn drive(
        &self,
        article: &Article,
        options: PublishOptions,
        progress: &mut Progress<'_>,
    ) -> Result<PublishOutcome, WorkflowError> {
        let def = &self.definition;
        let executor = self.executor();
        let mut ctx = ExecutionContext::new(article);

        let create = def.endpoint(endpoint_names::CREATE_DRAFT);
        let update = def.endpoint(endpoint_names::UPDATE_DRAFT);
        let publish = def.endpoint(endpoint_names::PUBLISH);

        if create.is_none() && publish.is_none() {
            return Err(WorkflowError::Unsupported(format!(
                "{} defines neither create_draft nor publish",
                def.id
            )));
        }
        if options.draft_only && create.is_none() && update.is_none() {
            return Err(WorkflowError::Unsupported(format!(
                "{} has no draft endpoints",
                def.id
            )));
        }

        progress.advance(WorkflowState::CheckingAuth)?;
        self.authenticate(&executor, &mut ctx).await?;

        progress.advance(WorkflowState::Transforming)?;
        self.transform(article, &executor, &mut ctx, progress.cancel).await?;

        if let Some(endpoint) = create {
            progress.advance(WorkflowState::CreatingDraft)?;
            let outcome = executor.execute(endpoint, &ctx).await?;
            ctx.merge(&outcome.outputs);
        }

        if let Some(endpoint) = update {
            progress.advance(WorkflowState::UpdatingDraft)?;
            let outcome = executor.execute(endpoint, &ctx).await?;
            ctx.merge(&outcome.outputs);
        }

        let draft_id = ctx.get_string("draft_id");

        let Some(endpoint) = publish.filter(|_| !options.draft_only) else {
            progress.advance(WorkflowState::DraftOnly)?;
            let draft_url = render_template(def.draft_url_template.as_deref(), &ctx);
            progress.advance(WorkflowState::Done)?;
            return Ok(PublishOutcome {
                post_id: draft_id,
                post_url: draft_url,
                draft_only: true,
            });
        };

        progress.advance(WorkflowState::Publishing)?;
        let outcome = executor.execute(endpoint, &ctx).await?;
        ctx.merge(&outcome.outputs);

        let post_id = ctx.get_string("post_id").or(draft_id);
        if let Some(id) = &post_id {
            ctx.set("post_id", Value::String(id.clone()));
        }
        let post_url = ctx
            .get_string("post_url")
            .or_else(|| render_template(def.post_url_template.as_deref(), &ctx));

        progress.advance(WorkflowState::Done)?;
        Ok(PublishOutcome {
            post_id,
            post_url,
            draft_only: false,
        })
    }

    async fn authenticate(
        &self,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
    ) -> Result<Map<String, Value>, WorkflowError> {
        match executor.execute(&self.definition.auth_check, ctx).await {
            Ok(outcome) => {
                ctx.merge(&outcome.outputs);
                Ok(outcome.outputs)
            }
            Err(error @ (ExecuteError::Transport { .. } | ExecuteError::Rejected { .. })) => {
                Err(WorkflowError::NotAuthenticated(error.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn transform(
        &self,
        article: &Article,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let native = self.definition.content_format;
        let markdown = article.markdown.as_deref().filter(|s| !s.trim().is_empty());
        let html = article.html.as_deref().filter(|s| !s.trim().is_empty());

        let (mut content, mut format) = match (native, markdown, html) {
            (ContentFormat::Markdown, Some(md), _) => (md.to_string(), ContentFormat::Markdown),
            (_, _, Some(html)) => (self.content.preprocess(html), ContentFormat::Html),
            (_, Some(md), None) => {
                let html = self.content.markdown_to_html(md);
                (self.content.preprocess(&html), ContentFormat::Html)
            }
            (_, None, None) => {
                return Err(WorkflowError::Unsupported(
                    "article has no markdown or html content".to_string(),
                ));
            }
        };

        content = self.process_images(content, executor, ctx, cancel).await?;
        self.upload_cover(article, executor, ctx, cancel).await?;

        if self.hook_enabled(HookKind::ContentTransform) {
            content = self
                .hooks
                .content_transform(content, ctx)
                .await
                .map_err(|e| WorkflowError::Hook(format!("content_transform: {e}")))?;
        }

        if format != native {
            content = match native {
                ContentFormat::Html => self.content.markdown_to_html(&content),
                ContentFormat::Markdown => self.content.html_to_markdown(&content),
            };
            format = native;
        }

        let field = match format {
            ContentFormat::Html => "html",
            ContentFormat::Markdown => "markdown",
        };
        ctx.set_article_field(field, Value::String(content.clone()));
        ctx.set_article_field("content", Value::String(content));
        Ok(())
    }

    fn can_upload_images(&self) -> bool {
        self.hook_enabled(HookKind::UploadImageByUrl)
            || self.definition.endpoint(endpoint_names::UPLOAD_IMAGE).is_some()
    }

    async fn process_images(
        &self,
        content: String,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<String, WorkflowError> {
        if self.hook_enabled(HookKind::ProcessImages) {
            return self
                .hooks
                .process_images(content, ctx, self.transport.as_ref())
                .await
                .map_err(|e| WorkflowError::Hook(format!("process_images: {e}")));
        }

        if !self.definition.supports(Capability::ImageUpload) || !self.can_upload_images() {
            return Ok(content);
        }

        let mut hosted_by_src = BTreeMap::new();
        for (index, src) in image_sources(&content).into_iter().enumerate() {
            if index > 0 {
                self.pace(cancel).await?;
            }
            let uploaded = self.upload_image_or_cancel(&src, executor, ctx, cancel).await;
            match uploaded {
                Ok(hosted) => {
                    hosted_by_src.insert(src, hosted);
                }
                Err(WorkflowError::Cancelled) => return Err(WorkflowError::Cancelled),
                Err(error) => {
                    tracing::warn!(
                        platform = %self.id(),
                        image = %src,
                        error = %error,
                        "Image upload failed, keeping original URL"
                    );
                }
            }
        }
        Ok(rewrite_image_sources(&content, &hosted_by_src))
    }

    async fn upload_cover(
        &self,
        article: &Article,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let Some(cover) = article.cover.as_deref().filter(|_| article.has_cover()) else {
            return Ok(());
        };
        if !self.definition.supports(Capability::Cover) || !self.can_upload_images() {
            return Ok(());
        }

        let uploaded = self.upload_image_or_cancel(cover, executor, ctx, cancel).await;
        match uploaded {
            Ok(hosted) => ctx.set_article_field("cover", Value::String(hosted)),
            Err(WorkflowError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(error) => {
                tracing::warn!(
                    platform = %self.id(),
                    cover = %cover,
                    error = %error,
                    "Cover upload failed, publishing without cover"
                );
                ctx.set_article_field("cover", Value::String(String::new()));
            }
        }
        Ok(())
    }

    /// Upload one image, abandoning it as soon as `cancel` fires
    async fn upload_image_or_cancel(
        &self,
        src: &str,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<String, WorkflowError> {
        if cancel.is_cancelled() {
            tracing::info!(platform = %self.id(), image = %src, "Cancellation observed before upload");
            return Err(WorkflowError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(platform = %self.id(), image = %src, "Cancellation observed during upload");
                Err(WorkflowError::Cancelled)
            }
            result = self.upload_image(src, executor, ctx) => result,
        }
    }

    async fn upload_image(
        &self,
        src: &str,
        executor: &EndpointExecutor<'_>,
        ctx: &mut ExecutionContext,
    ) -> Result<String, WorkflowError> {
        if self.hook_enabled(HookKind::UploadImageByUrl) {
            return self
                .hooks
                .upload_image_by_url(src, ctx, self.transport.as_ref())
                .await
                .map_err(|e| WorkflowError::ImageUpload(e.to_string()));
        }

        let Some(endpoint) = self.definition.endpoint(endpoint_names::UPLOAD_IMAGE) else {
            return Err(WorkflowError::Unsupported("no image uploader".to_string()));
        };

        let blob = self.download(src).await?;
        ctx.set_blob("image", blob);
        ctx.set("image_url", Value::String(src.to_string()));
        let result = executor.execute(endpoint, ctx).await;
        ctx.remove_blob("image");

        let outcome = result.map_err(|e| WorkflowError::ImageUpload(e.to_string()))?;
        let hosted = stringify(outcome.outputs.get("url"));
        if hosted.is_empty() {
            return Err(WorkflowError::ImageUpload(format!(
                "upload of {src} returned no url"
            )));
        }
        Ok(hosted)
    }

    async fn download(&self, src: &str) -> Result<Blob, WorkflowError> {
        let response = self
            .transport
            .fetch(HttpRequest::get(src))
            .await
            .map_err(|e| WorkflowError::ImageUpload(format!("download {src}: {e}")))?;

        if !(200..300).contains(&response.status) {
            let error = TransportError::Status {
                status: response.status,
                body: String::new(),
            };
            return Err(WorkflowError::ImageUpload(format!("download {src}: {error}")));
        }

        let filename = src
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("image")
            .to_string();
        let mime = response
            .header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| guess_mime(&filename).to_string());

        Ok(Blob {
            bytes: response.body,
            mime,
            filename,
        })
    }

    async fn pace(&self, cancel: &CancellationToken) -> Result<(), WorkflowError> {
        if let Some(ms) = self.definition.request_delay_ms.filter(|ms| *ms > 0) {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            }
        }
        Ok(())
    }
}

fn render_template(template: Option<&str>, ctx: &ExecutionContext) -> Option<String> {
    template
        .map(|t| interpolate(t, ctx.as_value()))
        .filter(|url| !url.is_empty())
}

/// Distinct remote image URLs in HTML or markdown, in document order
fn image_sources(content: &str) -> Vec<String> {
    let mut seen = Vec::new();
    let found = HTML_IMAGE
        .captures_iter(content)
        .chain(MARKDOWN_IMAGE.captures_iter(content))
        .map(|c| c[1].to_string());
    for src in found {
        if (src.starts_with("http://") || src.starts_with("https://")) && !seen.contains(&src) {
            seen.push(src);
        }
    }
    seen
}

/// Swap uploaded image URLs in, touching only `src="..."` and `](...)` spans
fn rewrite_image_sources(content: &str, hosted_by_src: &BTreeMap<String, String>) -> String {
    if hosted_by_src.is_empty() {
        return content.to_string();
    }

    let swap = |caps: &regex::Captures<'_>| -> String {
        let text = &caps[0];
        let Some(src) = caps.get(1) else {
            return text.to_string();
        };
        let Some(hosted) = hosted_by_src.get(src.as_str()) else {
            return text.to_string();
        };
        let offset = caps.get(0).map_or(0, |m| m.start());
        format!(
            "{}{}{}",
            &text[..src.start() - offset],
            hosted,
            &text[src.end() - offset..]
        )
    };

    let html = HTML_IMAGE.replace_all(content, swap);
    MARKDOWN_IMAGE.replace_all(&html, swap).into_owned()
}

fn guess_mime(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
