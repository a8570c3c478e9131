//! Persisted records: sources, content items and sync runs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SourceId = u64;
pub type RunId = u64;
/// Hex digest, see [`content_id`].
pub type ContentId = String;

/// Upstream flavour. Picks the adapter and the scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Syndication,
    ChannelFeed,
    ModelHub,
    RepositoryHub,
    Microblog,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Syndication,
        SourceKind::ChannelFeed,
        SourceKind::ModelHub,
        SourceKind::RepositoryHub,
        SourceKind::Microblog,
    ];

    pub fn content_kind(self) -> ContentKind {
        match self {
            SourceKind::Syndication => ContentKind::Article,
            SourceKind::ChannelFeed => ContentKind::Video,
            SourceKind::ModelHub => ContentKind::Model,
            SourceKind::RepositoryHub => ContentKind::Repo,
            SourceKind::Microblog => ContentKind::Post,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Syndication => "syndication",
            SourceKind::ChannelFeed => "channel_feed",
            SourceKind::ModelHub => "model_hub",
            SourceKind::RepositoryHub => "repository_hub",
            SourceKind::Microblog => "microblog",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Video,
    Model,
    Repo,
    Post,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Article,
        ContentKind::Video,
        ContentKind::Model,
        ContentKind::Repo,
        ContentKind::Post,
    ];
}

/// Configured upstream origin. Unique on `origin_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    pub origin_url: String,
    pub category: String,
    pub enabled: bool,
    pub consecutive_errors: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin input for [`Source`] creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub kind: SourceKind,
    pub origin_url: String,
    #[serde(default)]
    pub category: String,
}

/// Upstream metrics, one closed variant per content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindMetrics {
    Article { comments: u64 },
    Video { views: u64, likes: u64 },
    Model { downloads: u64, likes: u64 },
    Repo { stars: u64, forks: u64 },
    Post { followers: u64, likes: u64, reposts: u64 },
}

impl KindMetrics {
    pub fn content_kind(&self) -> ContentKind {
        match self {
            KindMetrics::Article { .. } => ContentKind::Article,
            KindMetrics::Video { .. } => ContentKind::Video,
            KindMetrics::Model { .. } => ContentKind::Model,
            KindMetrics::Repo { .. } => ContentKind::Repo,
            KindMetrics::Post { .. } => ContentKind::Post,
        }
    }

    /// Dominant volume metric (downloads, stars, views, followers).
    pub fn volume(&self) -> u64 {
        match *self {
            KindMetrics::Article { .. } => 0,
            KindMetrics::Video { views, .. } => views,
            KindMetrics::Model { downloads, .. } => downloads,
            KindMetrics::Repo { stars, .. } => stars,
            KindMetrics::Post { followers, .. } => followers,
        }
    }

    pub fn secondary(&self) -> u64 {
        match *self {
            KindMetrics::Article { comments } => comments,
            KindMetrics::Video { likes, .. } => likes,
            KindMetrics::Model { likes, .. } => likes,
            KindMetrics::Repo { forks, .. } => forks,
            KindMetrics::Post { likes, .. } => likes,
        }
    }
}

/// Local engagement. Like/bookmark counters are the sizes of the user sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounters {
    pub views: u64,
    #[serde(default)]
    pub liked_by: BTreeSet<String>,
    #[serde(default)]
    pub bookmarked_by: BTreeSet<String>,
}

impl EngagementCounters {
    pub fn likes(&self) -> u64 {
        self.liked_by.len() as u64
    }

    pub fn bookmarks(&self) -> u64 {
        self.bookmarked_by.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.views == 0 && self.liked_by.is_empty() && self.bookmarked_by.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub external: f64,
    pub local: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// One normalized, deduplicated unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub source_id: SourceId,
    pub source_kind: SourceKind,
    pub kind: ContentKind,
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub canonical_url: String,
    pub author: Option<String>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category: String,
    pub metrics: KindMetrics,
    pub trending: bool,
    #[serde(default)]
    pub engagement: EngagementCounters,
    pub scores: Scores,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub saved: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errored: u64,
}

/// One ingestion attempt of a single source. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: RunId,
    pub source_id: SourceId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: RunCounts,
    pub status: RunStatus,
    pub error: Option<String>,
}

/// Stable id for an item: 16 hex chars of SHA-256 over `kind:external_id`.
pub fn content_id(kind: SourceKind, external_id: &str) -> ContentId {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(external_id.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_is_stable_and_kind_scoped() {
        let a = content_id(SourceKind::ModelHub, "org/model");
        assert_eq!(a, content_id(SourceKind::ModelHub, "org/model"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, content_id(SourceKind::RepositoryHub, "org/model"));
    }

    #[test]
    fn metrics_serialize_with_kind_tag() {
        let m = KindMetrics::Repo { stars: 3, forks: 1 };
        let v = serde_json::to_value(m).unwrap();
        assert_eq!(v["kind"], "repo");
        assert_eq!(v["stars"], 3);
    }
}
