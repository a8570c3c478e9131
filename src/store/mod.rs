//! Persistence gateway.
//!
//! Reads are synchronous (in-memory indexes); writes are async so a store
//! can suspend on I/O. No write mutates fields on its own: callers compute
//! scores before persisting.

pub mod journal;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::IdentityIndex;
use crate::error::PersistenceError;
use crate::model::{ContentId, ContentItem, ContentKind, NewSource, Source, SourceId, SyncRun};

pub use local::LocalStore;

/// Ordering for presentation reads. Always descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PublishedAt,
    FinalScore,
    LocalScore,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::PublishedAt, SortKey::FinalScore, SortKey::LocalScore];
}

/// Integer sort key so floats and timestamps share one ordered index shape.
pub fn sort_value(item: &ContentItem, sort: SortKey) -> i64 {
    match sort {
        SortKey::PublishedAt => item
            .published_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN),
        SortKey::FinalScore => score_key(item.scores.final_score),
        SortKey::LocalScore => score_key(item.scores.local),
    }
}

/// Scores with micro-point resolution.
pub fn score_key(score: f64) -> i64 {
    (score * 1_000_000.0).round() as i64
}

#[async_trait]
pub trait ContentStore: IdentityIndex + Send + Sync {
    fn get_item(&self, id: &str) -> Option<ContentItem>;

    /// Fails with `Conflict` if canonical URL or (external id, kind) is taken.
    async fn insert_item(&self, item: ContentItem) -> Result<(), PersistenceError>;

    /// Replace a stored item by id.
    async fn update_item(&self, item: ContentItem) -> Result<(), PersistenceError>;

    /// Read-modify-write under the store's lock. Returns the stored result.
    async fn modify_item(
        &self,
        id: &str,
        f: &mut (dyn for<'x> FnMut(&'x mut ContentItem) + Send),
    ) -> Result<ContentItem, PersistenceError>;

    /// Walk active items in index order (highest value first, ties by id)
    /// under one read of the store.
    fn visit_ordered(
        &self,
        sort: SortKey,
        kind: Option<ContentKind>,
        visit: &mut dyn FnMut(i64, &ContentItem),
    );

    /// Active items as `(sort value, id)`, in [`ContentStore::visit_ordered`] order.
    fn ordered_items(&self, sort: SortKey, kind: Option<ContentKind>) -> Vec<(i64, ContentId)> {
        let mut rows = Vec::new();
        self.visit_ordered(sort, kind, &mut |value, item| rows.push((value, item.id.clone())));
        rows
    }

    fn items_for_source(&self, source_id: SourceId) -> Vec<ContentId>;

    fn item_count(&self) -> usize;
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Fails with `Conflict` on a duplicate origin URL.
    async fn create_source(
        &self,
        new: NewSource,
        now: DateTime<Utc>,
    ) -> Result<Source, PersistenceError>;

    fn get_source(&self, id: SourceId) -> Option<Source>;

    fn list_sources(&self) -> Vec<Source>;

    async fn update_source(&self, source: Source) -> Result<(), PersistenceError>;

    /// `Ok(false)` for an unknown id; `RunInProgress` while a run is open.
    async fn delete_source(&self, id: SourceId) -> Result<bool, PersistenceError>;

    /// Atomically refuse (`RunInProgress`) or record a new running run.
    async fn begin_run(
        &self,
        source_id: SourceId,
        now: DateTime<Utc>,
    ) -> Result<SyncRun, PersistenceError>;

    /// Store the final state of a run started with [`SourceStore::begin_run`].
    /// Releases the source's running slot even when it returns an error.
    async fn finish_run(&self, run: SyncRun) -> Result<(), PersistenceError>;

    /// Newest first.
    fn runs_for(&self, source_id: SourceId, limit: usize) -> Vec<SyncRun>;

    fn running_run(&self, source_id: SourceId) -> Option<SyncRun>;
}

/// Everything the orchestrator needs from durable storage.
pub trait Storage: ContentStore + SourceStore {}

impl<T: ContentStore + SourceStore + ?Sized> Storage for T {}
