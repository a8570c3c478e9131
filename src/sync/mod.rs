// src/sync/mod.rs
//! Sync orchestrator: drives one source through
//! `Idle -> Running -> {Succeeded, Failed} -> Idle`.
//!
//! Item-level problems (bad entries, rejected writes) are counted on the run
//! and never fail it. Source-level problems (fetch, parse, configuration)
//! fail the run and feed the source's health.

pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dedup::{self, canonicalize_url, IdentityIndex, Origin, Resolution};
use crate::error::{ConfigurationError, IngestError, PersistenceError, SyncError};
use crate::ingest::fetch::Fetcher;
use crate::ingest::types::{FetchContext, NormalizedItem};
use crate::ingest::{ensure_metrics_described, AdapterRegistry};
use crate::model::{
    content_id, ContentItem, EngagementCounters, RunCounts, RunStatus, Source, SourceId, SyncRun,
};
use crate::scoring;
use crate::store::{ContentStore, SourceStore, Storage};

/// Orchestrator knobs, usually derived from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub interval: Duration,
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub external_weight: f64,
    pub max_consecutive_failures: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SyncSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            interval: cfg.sync_interval(),
            workers: cfg.workers.max(1),
            fetch_timeout: cfg.fetch_timeout(),
            external_weight: cfg.external_weight.clamp(0.0, 1.0),
            max_consecutive_failures: cfg.max_consecutive_failures.max(1),
        }
    }
}

/// What happened to one incoming entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Saved,
    Updated,
    Skipped,
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sources skipped because a run was already in flight.
    pub busy: usize,
    pub counts: RunCounts,
}

pub struct Orchestrator {
    store: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    adapters: AdapterRegistry,
    settings: SyncSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        adapters: AdapterRegistry,
        settings: SyncSettings,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            fetcher,
            adapters,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Enabled sources never synced or last synced at least one interval ago.
    pub fn eligible(&self, now: DateTime<Utc>) -> Vec<Source> {
        let interval = chrono::Duration::from_std(self.settings.interval)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        self.store
            .list_sources()
            .into_iter()
            .filter(|s| s.enabled)
            .filter(|s| match s.last_synced_at {
                None => true,
                Some(t) => now.signed_duration_since(t) >= interval,
            })
            .collect()
    }

    /// Sync every eligible source on the bounded worker pool.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> PassReport {
        let due = self.eligible(now);
        let mut report = PassReport {
            dispatched: due.len(),
            ..PassReport::default()
        };

        let results: Vec<Result<SyncRun, SyncError>> = stream::iter(due)
            .map(|s| self.sync_source(s.id))
            .buffer_unordered(self.settings.workers)
            .collect()
            .await;

        for r in results {
            match r {
                Ok(run) => {
                    match run.status {
                        RunStatus::Succeeded => report.succeeded += 1,
                        _ => report.failed += 1,
                    }
                    report.counts.saved += run.counts.saved;
                    report.counts.updated += run.counts.updated;
                    report.counts.skipped += run.counts.skipped;
                    report.counts.errored += run.counts.errored;
                }
                Err(SyncError::AlreadyRunning(_)) => report.busy += 1,
                Err(e) => {
                    warn!(target: "sync", error = %e, "source not synced");
                    report.failed += 1;
                }
            }
        }

        gauge!("sync_last_pass_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "sync",
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed,
            busy = report.busy,
            saved = report.counts.saved,
            updated = report.counts.updated,
            "sync pass finished"
        );
        report
    }

    /// One full run for one source. `Err` only when the run was refused or
    /// its bookkeeping could not be stored; a failed fetch is `Ok` with a
    /// `Failed` run. Health is recorded even when closing the run fails.
    pub async fn sync_source(&self, source_id: SourceId) -> Result<SyncRun, SyncError> {
        let source = self
            .store
            .get_source(source_id)
            .ok_or(SyncError::UnknownSource(source_id))?;
        if !source.enabled {
            return Err(SyncError::Disabled(source_id));
        }

        let mut run = match self.store.begin_run(source_id, Utc::now()).await {
            Ok(run) => run,
            Err(PersistenceError::RunInProgress(id)) => return Err(SyncError::AlreadyRunning(id)),
            Err(PersistenceError::NotFound(_)) => return Err(SyncError::UnknownSource(source_id)),
            Err(e) => return Err(e.into()),
        };
        debug!(target: "sync", source_id, run_id = run.id, kind = source.kind.as_str(), "run started");

        let failure = match self.ingest(&source, &mut run.counts).await {
            Ok(()) => None,
            Err(e) => Some(e),
        };

        run.finished_at = Some(Utc::now());
        run.status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        run.error = failure.as_ref().map(|e| e.to_string());
        let closed = self.store.finish_run(run.clone()).await;
        if let Err(ref e) = closed {
            warn!(target: "sync", source_id, run_id = run.id, error = %e, "run could not be closed");
        }
        let health = self
            .record_health(source_id, failure.as_ref(), run.finished_at)
            .await;

        let status = match run.status {
            RunStatus::Succeeded => "succeeded",
            _ => "failed",
        };
        counter!("sync_runs_total", "status" => status).increment(1);
        counter!("sync_items_saved_total").increment(run.counts.saved);
        counter!("sync_items_updated_total").increment(run.counts.updated);
        counter!("sync_items_skipped_total").increment(run.counts.skipped);
        counter!("sync_items_errored_total").increment(run.counts.errored);

        match failure {
            None => info!(
                target: "sync",
                source_id,
                run_id = run.id,
                saved = run.counts.saved,
                updated = run.counts.updated,
                skipped = run.counts.skipped,
                errored = run.counts.errored,
                "run succeeded"
            ),
            Some(ref e) => {
                counter!("ingest_fetch_errors_total", "kind" => source.kind.as_str()).increment(1);
                warn!(target: "sync", source_id, run_id = run.id, error = %e, "run failed")
            }
        }
        closed?;
        health?;
        Ok(run)
    }

    /// Fetch and process every entry. `Err` is a source-level failure.
    async fn ingest(&self, source: &Source, counts: &mut RunCounts) -> Result<(), IngestError> {
        let adapter = self
            .adapters
            .get(source.kind)
            .ok_or(ConfigurationError::NoAdapter(source.kind))?;
        adapter.check(source)?;

        // The budget travels on the request and covers the upstream call
        // only; waiting for a rate limit slot is not charged to it.
        let ctx = FetchContext {
            source,
            timeout: self.settings.fetch_timeout,
        };
        let items = adapter.fetch(ctx, self.fetcher.as_ref()).await?;

        for entry in items {
            counter!("ingest_items_total", "kind" => source.kind.as_str()).increment(1);
            let item = match entry {
                Ok(item) => item,
                Err(e) => {
                    counter!("ingest_rejected_total", "kind" => source.kind.as_str()).increment(1);
                    debug!(target: "ingest", source_id = source.id, error = %e, "entry rejected");
                    counts.errored += 1;
                    continue;
                }
            };
            match self.persist(source, item).await {
                Ok(Outcome::Saved) => counts.saved += 1,
                Ok(Outcome::Updated) => counts.updated += 1,
                Ok(Outcome::Skipped) => counts.skipped += 1,
                Err(e) => {
                    warn!(target: "sync", source_id = source.id, error = %e, "item write failed");
                    counts.errored += 1;
                }
            }
        }
        Ok(())
    }

    async fn persist(
        &self,
        source: &Source,
        mut item: NormalizedItem,
    ) -> Result<Outcome, PersistenceError> {
        item.canonical_url = canonicalize_url(&item.canonical_url);
        let now = Utc::now();
        let w = self.settings.external_weight;

        let origin = Origin {
            source_id: source.id,
            kind: source.kind,
        };
        match dedup::resolve(&item, origin, self.store.as_ref()) {
            Resolution::New => {
                let scores = scoring::score(
                    &item.metrics,
                    item.trending,
                    &EngagementCounters::default(),
                    w,
                );
                let record = ContentItem {
                    id: content_id(source.kind, &item.external_id),
                    source_id: source.id,
                    source_kind: source.kind,
                    kind: source.kind.content_kind(),
                    external_id: item.external_id,
                    title: item.title,
                    summary: item.summary,
                    body: item.body,
                    canonical_url: item.canonical_url,
                    author: item.author,
                    media: item.media,
                    tags: item.tags,
                    category: source.category.clone(),
                    metrics: item.metrics,
                    trending: item.trending,
                    engagement: EngagementCounters::default(),
                    scores,
                    published_at: item.published_at,
                    created_at: now,
                    updated_at: now,
                    active: true,
                };
                self.store.insert_item(record).await?;
                Ok(Outcome::Saved)
            }
            Resolution::Match(id) => {
                let existing = self
                    .store
                    .get_item(&id)
                    .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
                // Only the owning source rewrites a record; mirrors would
                // otherwise flip it back and forth every pass.
                if existing.source_id != source.id
                    && self.store.get_source(existing.source_id).is_some()
                {
                    return Ok(Outcome::Skipped);
                }
                let merged = self.merge(source, &existing, item);
                if merged == existing {
                    return Ok(Outcome::Skipped);
                }
                let merged = ContentItem {
                    updated_at: now,
                    ..merged
                };
                self.store.update_item(merged).await?;
                Ok(Outcome::Updated)
            }
        }
    }

    /// Stored record with the incoming fields applied and scores recomputed.
    /// Identity, engagement and timestamps are kept.
    fn merge(&self, source: &Source, existing: &ContentItem, item: NormalizedItem) -> ContentItem {
        let mut next = existing.clone();

        // Another record may already own the new URL; keep ours then.
        let url_owner = self.store.by_canonical_url(&item.canonical_url);
        if url_owner.is_none() || url_owner.as_deref() == Some(existing.id.as_str()) {
            next.canonical_url = item.canonical_url;
        }
        next.title = item.title;
        next.summary = item.summary;
        next.body = item.body;
        next.author = item.author;
        next.media = item.media;
        next.tags = item.tags;
        next.metrics = item.metrics;
        next.trending = item.trending;
        if item.published_at.is_some() {
            next.published_at = item.published_at;
        }
        next.active = true;
        // Orphans of a deleted source are adopted by the source that sees them.
        if self.store.get_source(existing.source_id).is_none() {
            next.source_id = source.id;
            next.category = source.category.clone();
        }
        next.scores = scoring::score(
            &next.metrics,
            next.trending,
            &next.engagement,
            self.settings.external_weight,
        );
        next
    }

    async fn record_health(
        &self,
        source_id: SourceId,
        failure: Option<&IngestError>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), PersistenceError> {
        // Re-read: the admin may have edited the source during the run.
        let Some(mut source) = self.store.get_source(source_id) else {
            return Ok(());
        };
        match failure {
            None => {
                source.consecutive_errors = 0;
                source.last_error = None;
                source.last_synced_at = finished_at;
            }
            Some(e) => {
                source.consecutive_errors = source.consecutive_errors.saturating_add(1);
                source.last_error = Some(e.to_string());
                let fatal = matches!(e, IngestError::Configuration(_));
                if source.enabled
                    && (fatal || source.consecutive_errors >= self.settings.max_consecutive_failures)
                {
                    source.enabled = false;
                    counter!("sync_sources_disabled_total").increment(1);
                    warn!(
                        target: "sync",
                        source_id,
                        consecutive_errors = source.consecutive_errors,
                        configuration = fatal,
                        "source disabled"
                    );
                }
            }
        }
        self.store.update_source(source).await
    }
}
