//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// An authored article to be published to one or more platforms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    /// Article title
    #[serde(default)]
    pub title: String,
    /// Markdown source, if authored in markdown
    #[serde(default)]
    pub markdown: Option<String>,
    /// HTML body, if available
    #[serde(default)]
    pub html: Option<String>,
    /// Short summary / digest
    #[serde(default)]
    pub summary: Option<String>,
    /// Cover image URL
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Where the article was originally published, if anywhere
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Article {
    /// Whether the article carries a non-empty cover URL
    pub fn has_cover(&self) -> bool {
        self.cover.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Capability tags a platform can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Article,
    Draft,
    ImageUpload,
    Categories,
    Tags,
    Cover,
    Schedule,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Article,
        Capability::Draft,
        Capability::ImageUpload,
        Capability::Categories,
        Capability::Tags,
        Capability::Cover,
        Capability::Schedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Article => "article",
            Capability::Draft => "draft",
            Capability::ImageUpload => "image_upload",
            Capability::Categories => "categories",
            Capability::Tags => "tags",
            Capability::Cover => "cover",
            Capability::Schedule => "schedule",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// Native body format of a platform's editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    #[default]
    Html,
    Markdown,
}

/// Lifecycle status of a sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome of publishing to one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Platform id
    pub platform: String,
    pub success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub post_id: Option<String>,
    pub post_url: Option<String>,
    /// True when only a platform-side draft was saved
    pub draft_only: bool,
    pub error: Option<String>,
}

impl SyncResult {
    /// A published post
    pub fn published(
        platform: impl Into<String>,
        post_id: Option<String>,
        post_url: Option<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            success: true,
            timestamp: OffsetDateTime::now_utc(),
            post_id,
            post_url,
            draft_only: false,
            error: None,
        }
    }

    /// A saved draft that was not made public
    pub fn draft(
        platform: impl Into<String>,
        draft_id: Option<String>,
        draft_url: Option<String>,
    ) -> Self {
        Self {
            draft_only: true,
            ..Self::published(platform, draft_id, draft_url)
        }
    }

    /// A failed attempt
    pub fn failed(platform: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            success: false,
            timestamp: OffsetDateTime::now_utc(),
            post_id: None,
            post_url: None,
            draft_only: false,
            error: Some(error.into()),
        }
    }
}

/// One multi-platform publish request and its collected results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: Uuid,
    pub article: Article,
    /// Target platforms in requested order
    pub platforms: Vec<String>,
    pub status: SyncStatus,
    /// One entry per completed platform, in completion order
    pub results: Vec<SyncResult>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl SyncTask {
    pub fn new(article: Article, platforms: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            article,
            platforms,
            status: SyncStatus::Pending,
            results: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        }
    }

    /// Result recorded for a platform, if it ran
    pub fn result_for(&self, platform: &str) -> Option<&SyncResult> {
        self.results.iter().find(|r| r.platform == platform)
    }

    /// Platforms whose result failed, in requested order
    pub fn failed_platforms(&self) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|p| self.result_for(p).is_some_and(|r| !r.success))
            .cloned()
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Fold a retry run's results over this task's and re-derive the status
    pub fn merge_retry(&mut self, retry: &SyncTask) {
        for result in &retry.results {
            match self.results.iter_mut().find(|r| r.platform == result.platform) {
                Some(existing) => *existing = result.clone(),
                None => self.results.push(result.clone()),
            }
        }
        self.finish(retry.completed_at.unwrap_or_else(OffsetDateTime::now_utc));
    }

    /// Freeze the task with a final status derived from its results
    pub(crate) fn finish(&mut self, now: OffsetDateTime) {
        self.status = if self.results.iter().all(|r| r.success) {
            SyncStatus::Completed
        } else {
            SyncStatus::Failed
        };
        self.completed_at = Some(now);
    }
}
