//! Sync orchestrator - fans an article out to many platforms

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::model::{Article, SyncResult, SyncStatus, SyncTask};
use crate::ports::PlatformRegistry;
use crate::runtime::{PublishOptions, WorkflowError};

/// Upper bound on extra attempts per platform, whatever the options ask for
pub const MAX_RETRIES: u32 = 5;

/// Longest single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Callback fired once per finished platform
pub type ProgressFn = Arc<dyn Fn(&str, &SyncResult) + Send + Sync>;

/// Options for one sync run
#[derive(Clone)]
pub struct SyncOptions {
    /// Platforms per batch (in-flight bound)
    pub concurrency: usize,
    /// Keep scheduling batches after a failure
    pub continue_on_error: bool,
    /// Stop every platform after its draft step
    pub draft_only: bool,
    /// Extra attempts after a transport failure, capped at [`MAX_RETRIES`]
    pub retries: u32,
    pub retry_base_delay: Duration,
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressFn>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            continue_on_error: true,
            draft_only: false,
            retries: 2,
            retry_base_delay: Duration::from_millis(500),
            cancel: CancellationToken::new(),
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("concurrency", &self.concurrency)
            .field("continue_on_error", &self.continue_on_error)
            .field("draft_only", &self.draft_only)
            .field("retries", &self.retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Runs adapter workflows in sequential batches of concurrent platforms
pub struct SyncOrchestrator<R>
where
    R: PlatformRegistry + ?Sized,
{
    registry: Arc<R>,
}

impl<R> SyncOrchestrator<R>
where
    R: PlatformRegistry + ?Sized,
{
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Publish `article` to every platform in `platforms`
    ///
    /// Always returns a finished task; per-platform failures live in
    /// `results`. Platforms skipped by an early stop are absent.
    pub async fn sync(
        &self,
        article: Article,
        platforms: Vec<String>,
        options: &SyncOptions,
    ) -> SyncTask {
        let mut task = SyncTask::new(article, platforms);
        task.status = SyncStatus::Running;

        tracing::info!(
            task_id = %task.id,
            platforms = task.platforms.len(),
            concurrency = options.concurrency,
            "Starting sync"
        );

        let queue = task.platforms.clone();
        let batch_size = options.concurrency.max(1);

        for (index, batch) in queue.chunks(batch_size).enumerate() {
            if options.cancel.is_cancelled() {
                tracing::info!(task_id = %task.id, batch = index + 1, "Cancellation observed, not scheduling further batches");
                break;
            }

            tracing::info!(task_id = %task.id, batch = index + 1, size = batch.len(), "Starting batch");

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|platform| self.run_platform(&task.article, platform, options))
                .collect();

            let mut batch_failed = false;
            while let Some(result) = in_flight.next().await {
                if let Some(on_progress) = &options.on_progress {
                    on_progress(&result.platform, &result);
                }
                batch_failed |= !result.success;
                task.results.push(result);
            }

            if batch_failed && !options.continue_on_error {
                tracing::info!(task_id = %task.id, batch = index + 1, "Batch had failures, stopping");
                break;
            }
        }

        task.finish(OffsetDateTime::now_utc());

        tracing::info!(
            task_id = %task.id,
            status = ?task.status,
            succeeded = task.success_count(),
            finished = task.results.len(),
            "Sync finished"
        );

        task
    }

    /// Re-run only the platforms that failed in `previous`
    pub async fn retry_failed(&self, previous: &SyncTask, options: &SyncOptions) -> SyncTask {
        self.sync(previous.article.clone(), previous.failed_platforms(), options)
            .await
    }

    /// Publish to a single platform with the same retry policy
    pub async fn sync_to_platform(
        &self,
        article: &Article,
        platform_id: &str,
        options: &SyncOptions,
    ) -> SyncResult {
        self.run_platform(article, platform_id, options).await
    }

    async fn run_platform(
        &self,
        article: &Article,
        platform: &str,
        options: &SyncOptions,
    ) -> SyncResult {
        let Some(runtime) = self.registry.get(platform) else {
            tracing::warn!(platform = %platform, "Platform not registered");
            return SyncResult::failed(platform, format!("Platform not registered: {platform}"));
        };

        let publish = PublishOptions {
            draft_only: options.draft_only,
        };
        let retries = options.retries.min(MAX_RETRIES);
        let mut attempt = 0;

        loop {
            let error = match runtime.run(article, publish, &options.cancel).await {
                Ok(outcome) => {
                    tracing::info!(platform = %platform, draft_only = outcome.draft_only, "Platform finished");
                    return outcome.into_result(platform);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= retries || options.cancel.is_cancelled()
            {
                tracing::warn!(platform = %platform, error = %error, "Platform failed");
                return SyncResult::failed(platform, error.to_string());
            }

            attempt += 1;
            let delay = backoff(options.retry_base_delay, attempt);
            tracing::warn!(
                platform = %platform,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transport error, retrying"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = options.cancel.cancelled() => {
                    return SyncResult::failed(platform, WorkflowError::Cancelled.to_string());
                }
            }
        }
    }
}

/// `base * 2^(attempt-1)`, saturating at [`MAX_RETRY_DELAY`]
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{HttpResponse, NoHooks, TransportError};
    use crate::runtime::AdapterRuntime;
    use crate::test_support::{FakeContent, FakeTransport, TestRegistry, definition};
    use serde_json::json;
    use std::sync::Mutex;

    fn platform(id: &str) -> crate::definition::AdapterDefinition {
        definition(json!({
            "id": id,
            "name": id,
            "homepage": format!("https://{id}.test"),
            "capabilities": ["article", "draft"],
            "auth": { "url": format!("https://{id}.test/api/me") },
            "endpoints": {
                "create_draft": {
                    "url": format!("https://{id}.test/api/drafts"),
                    "method": "POST",
                    "body": { "title": "{{article.title}}" },
                    "response": { "extract": { "draft_id": "$.id" } }
                },
                "update_draft": {
                    "url": format!("https://{id}.test/api/drafts/{{{{draft_id}}}}"),
                    "method": "PUT"
                }
            },
            "draft_url": format!("https://{id}.test/edit/{{{{draft_id}}}}")
        }))
    }

    fn setup(ids: &[&str], transport: FakeTransport) -> (SyncOrchestrator<TestRegistry>, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let registry = Arc::new(TestRegistry::default());
        for id in ids {
            let runtime = AdapterRuntime::new(
                platform(id),
                transport.clone(),
                Arc::new(NoHooks),
                Arc::new(FakeContent),
            )
            .unwrap();
            registry.register(runtime).unwrap();
        }
        (SyncOrchestrator::new(registry), transport)
    }

    fn article() -> Article {
        Article {
            title: "Hello".to_string(),
            html: Some("<p>Body</p>".to_string()),
            ..Default::default()
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn quick_retries() -> SyncOptions {
        SyncOptions {
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn unauthorized(id: &str) -> FakeTransport {
        FakeTransport::new().respond(&format!("{id}.test/api/me"), HttpResponse::new(401, "no session"))
    }

    #[tokio::test]
    async fn test_sequential_results_follow_input_order() {
        let (orchestrator, _) = setup(&["alpha", "beta", "gamma"], FakeTransport::new());
        let options = SyncOptions {
            concurrency: 1,
            ..Default::default()
        };

        let task = orchestrator
            .sync(article(), ids(&["gamma", "alpha", "beta"]), &options)
            .await;

        let order: Vec<_> = task.results.iter().map(|r| r.platform.as_str()).collect();
        assert_eq!(order, vec!["gamma", "alpha", "beta"]);
        assert_eq!(task.status, SyncStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.results.iter().all(|r| r.draft_only));
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_later_batches() {
        let (orchestrator, transport) = setup(&["alpha", "beta", "gamma"], unauthorized("beta"));
        let options = SyncOptions {
            concurrency: 2,
            continue_on_error: false,
            ..Default::default()
        };

        let task = orchestrator
            .sync(article(), ids(&["alpha", "beta", "gamma"]), &options)
            .await;

        assert_eq!(task.results.len(), 2);
        assert!(task.result_for("gamma").is_none());
        assert!(task.result_for("alpha").unwrap().success);
        assert_eq!(task.status, SyncStatus::Failed);
        assert!(!transport.urls().iter().any(|u| u.contains("gamma.test")));
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_everything() {
        let (orchestrator, _) = setup(&["alpha", "beta", "gamma"], unauthorized("alpha"));
        let options = SyncOptions {
            concurrency: 1,
            ..Default::default()
        };

        let task = orchestrator
            .sync(article(), ids(&["alpha", "beta", "gamma"]), &options)
            .await;

        assert_eq!(task.results.len(), 3);
        assert_eq!(task.success_count(), 2);
        assert_eq!(task.status, SyncStatus::Failed);
        assert_eq!(task.failed_platforms(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_retry_failed_targets_only_failed_platforms() {
        let (orchestrator, _) = setup(&["alpha", "beta"], unauthorized("beta"));
        let options = SyncOptions::default();

        let first = orchestrator
            .sync(article(), ids(&["alpha", "beta", "ghost"]), &options)
            .await;
        assert_eq!(first.failed_platforms(), vec!["beta", "ghost"]);

        let retry = orchestrator.retry_failed(&first, &options).await;
        assert_eq!(retry.platforms, vec!["beta", "ghost"]);
        assert!(retry.result_for("alpha").is_none());
        assert_eq!(retry.article.title, "Hello");
        assert_ne!(retry.id, first.id);
    }

    #[tokio::test]
    async fn test_unknown_platform_is_a_failed_result() {
        let (orchestrator, _) = setup(&["alpha"], FakeTransport::new());

        let task = orchestrator
            .sync(article(), ids(&["ghost"]), &SyncOptions::default())
            .await;

        let result = task.result_for("ghost").unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Platform not registered: ghost"));
    }

    #[tokio::test]
    async fn test_progress_fires_once_per_platform() {
        let (orchestrator, _) = setup(&["alpha", "beta", "gamma"], unauthorized("gamma"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = SyncOptions {
            concurrency: 2,
            on_progress: Some(Arc::new(move |platform: &str, result: &SyncResult| {
                sink.lock().unwrap().push((platform.to_string(), result.success));
            })),
            ..Default::default()
        };

        orchestrator
            .sync(article(), ids(&["alpha", "beta", "gamma"]), &options)
            .await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("alpha".to_string(), true),
                ("beta".to_string(), true),
                ("gamma".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_slow_step_cancels_only_in_flight_platform() {
        let transport = FakeTransport::new().respond_after(
            "slow.test/api/drafts",
            Duration::from_millis(200),
            HttpResponse::json(200, &json!({ "id": "s-1" })),
        );
        let (orchestrator, transport) = setup(&["fast", "slow"], transport);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let options = SyncOptions {
            concurrency: 2,
            cancel,
            on_progress: Some(Arc::new(move |platform: &str, _: &SyncResult| {
                if platform == "fast" {
                    trigger.cancel();
                }
            })),
            ..Default::default()
        };

        let task = orchestrator
            .sync(article(), ids(&["fast", "slow"]), &options)
            .await;

        assert!(task.result_for("fast").unwrap().success);
        let slow = task.result_for("slow").unwrap();
        assert!(!slow.success);
        assert_eq!(slow.error.as_deref(), Some("Cancelled"));
        assert!(!transport.urls().iter().any(|u| u.starts_with("https://slow.test/api/drafts/")));
        assert_eq!(task.status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_schedules_nothing() {
        let (orchestrator, transport) = setup(&["alpha"], FakeTransport::new());
        let options = SyncOptions::default();
        options.cancel.cancel();

        let task = orchestrator.sync(article(), ids(&["alpha"]), &options).await;

        assert!(task.results.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried_with_fresh_context() {
        let transport = FakeTransport::new().fail_times(
            "alpha.test/api/drafts",
            2,
            TransportError::Network("connection reset".into()),
        );
        let (orchestrator, transport) = setup(&["alpha"], transport);

        let result = orchestrator
            .sync_to_platform(&article(), "alpha", &quick_retries())
            .await;

        assert!(result.success, "{:?}", result.error);
        let auth_calls = transport
            .urls()
            .iter()
            .filter(|u| u.ends_with("/api/me"))
            .count();
        assert_eq!(auth_calls, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let transport = FakeTransport::new()
            .fail("alpha.test/api/drafts", TransportError::Network("connection reset".into()));
        let (orchestrator, transport) = setup(&["alpha"], transport);
        let options = SyncOptions {
            retries: 1,
            ..quick_retries()
        };

        let result = orchestrator.sync_to_platform(&article(), "alpha", &options).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection reset"));
        let attempts = transport
            .urls()
            .iter()
            .filter(|u| u.ends_with("/api/drafts"))
            .count();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_auth_failures_are_not_retried() {
        let (orchestrator, transport) = setup(&["alpha"], unauthorized("alpha"));

        let result = orchestrator
            .sync_to_platform(&article(), "alpha", &quick_retries())
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Not authenticated"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1), Duration::from_millis(500));
        assert_eq!(backoff(base, 3), Duration::from_secs(2));
        assert_eq!(backoff(base, 40), MAX_RETRY_DELAY);
        assert_eq!(backoff(Duration::MAX, 2), MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_retry_options_are_capped() {
        let transport = FakeTransport::new()
            .fail("alpha.test/api/drafts", TransportError::Network("connection reset".into()));
        let (orchestrator, transport) = setup(&["alpha"], transport);
        let options = SyncOptions {
            retries: u32::MAX,
            retry_base_delay: Duration::from_millis(u64::MAX),
            ..Default::default()
        };

        let result = orchestrator.sync_to_platform(&article(), "alpha", &options).await;

        assert!(!result.success);
        let attempts = transport
            .urls()
            .iter()
            .filter(|u| u.ends_with("/api/drafts"))
            .count();
        assert_eq!(attempts, MAX_RETRIES as usize + 1);
    }
}
