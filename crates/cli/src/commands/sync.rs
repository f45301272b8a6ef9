//! Sync command - publish one article to many platforms

use anyhow::{Context, Result};
use crosspost_domain::{
    PlatformRegistry, ProgressFn, SyncOptions, SyncOrchestrator, SyncResult, SyncStatus, SyncTask,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::args::SyncArgs;
use crate::article;
use crate::config::AppConfig;
use crate::wiring;

pub async fn execute(args: SyncArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let article = article::load(&args.article)?;
    let dir = wiring::definitions_dir(&config, args.definitions_dir.clone());
    let registry = wiring::build_registry(&config, &dir).await?;

    let platforms = if args.all {
        registry.list_registered_ids()
    } else {
        args.platforms.clone()
    };
    if platforms.is_empty() {
        anyhow::bail!("No platforms to sync; check {} and your config", dir.display());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling remaining platforms");
            ctrl_c.cancel();
        }
    });

    let on_progress: Option<ProgressFn> = if args.json {
        None
    } else {
        Some(Arc::new(|_platform: &str, result: &SyncResult| {
            println!("{}", progress_line(result));
        }))
    };

    let options = SyncOptions {
        concurrency: args.concurrency.unwrap_or(config.general.concurrency).max(1),
        continue_on_error: config.general.continue_on_error && !args.stop_on_error,
        draft_only: args.draft_only,
        retries: config.retries(),
        retry_base_delay: config.retry_base_delay(),
        cancel,
        on_progress,
    };

    tracing::info!(
        title = %article.title,
        platforms = ?platforms,
        draft_only = options.draft_only,
        "Article loaded"
    );

    let orchestrator = SyncOrchestrator::new(registry);
    let mut task = orchestrator.sync(article, platforms, &options).await;

    if args.retry_failed_once && task.status == SyncStatus::Failed && !options.cancel.is_cancelled() {
        let failed = task.failed_platforms();
        if !args.json {
            println!("Retrying {} failed platform(s): {}", failed.len(), failed.join(", "));
        }
        let retry = orchestrator.retry_failed(&task, &options).await;
        task.merge_retry(&retry);
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&task).context("Failed to serialize sync task")?
        );
    } else {
        print_summary(&task);
    }

    if task.status == SyncStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}

fn progress_line(result: &SyncResult) -> String {
    if !result.success {
        return format!(
            "✗ {}: {}",
            result.platform,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    let kind = if result.draft_only { "draft saved" } else { "published" };
    match result.post_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => format!("✓ {}: {} {}", result.platform, kind, url),
        None => format!("✓ {}: {}", result.platform, kind),
    }
}

fn print_summary(task: &SyncTask) {
    println!();
    println!("Sync {}", task.id);
    println!("========================================");
    println!(
        "{}/{} platforms succeeded",
        task.success_count(),
        task.platforms.len()
    );

    let skipped: Vec<&str> = task
        .platforms
        .iter()
        .filter(|p| task.result_for(p).is_none())
        .map(String::as_str)
        .collect();
    if !skipped.is_empty() {
        println!("Not attempted: {}", skipped.join(", "));
    }

    if let Some(completed_at) = task.completed_at {
        let elapsed = completed_at - task.created_at;
        println!("Finished in {:.1}s", elapsed.as_seconds_f64());
    }

    let symbol = if task.status == SyncStatus::Completed { "✓" } else { "✗" };
    println!("{} Status: {:?}", symbol, task.status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines() {
        let published = SyncResult::published("alpha", Some("1".into()), Some("https://a.test/p/1".into()));
        assert_eq!(progress_line(&published), "✓ alpha: published https://a.test/p/1");

        let draft = SyncResult::draft("beta", Some("9".into()), None);
        assert_eq!(progress_line(&draft), "✓ beta: draft saved");

        let failed = SyncResult::failed("gamma", "Not logged in");
        assert_eq!(progress_line(&failed), "✗ gamma: Not logged in");
    }
}
