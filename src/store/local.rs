//! In-process store: indexes in memory, every write journaled to disk.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::journal::{self, Journal, Record};
use super::{sort_value, ContentStore, SortKey, SourceStore};
use crate::dedup::{CompositeHit, CompositeKey, IdentityIndex};
use crate::error::PersistenceError;
use crate::model::{
    ContentId, ContentItem, ContentKind, NewSource, RunCounts, RunId, RunStatus, Source, SourceId,
    SourceKind, SyncRun,
};

/// Active items for one `(sort, kind filter)` pair: value desc, id asc.
type Ranked = BTreeSet<(Reverse<i64>, ContentId)>;

#[derive(Default)]
struct State {
    sources: BTreeMap<SourceId, Source>,
    source_by_origin: HashMap<String, SourceId>,
    items: HashMap<ContentId, ContentItem>,
    by_url: HashMap<String, ContentId>,
    by_external: HashMap<(SourceKind, String), ContentId>,
    by_composite: HashMap<CompositeKey, ContentId>,
    ranked: HashMap<(SortKey, Option<ContentKind>), Ranked>,
    runs: BTreeMap<RunId, SyncRun>,
    running: HashMap<SourceId, RunId>,
    next_source: SourceId,
    next_run: RunId,
    journal: Option<Journal>,
}

/// Every rank index an item belongs to: each sort key, unfiltered and by kind.
fn rank_slots(item: &ContentItem) -> Vec<((SortKey, Option<ContentKind>), i64)> {
    SortKey::ALL
        .iter()
        .flat_map(|&sort| {
            let value = sort_value(item, sort);
            [((sort, None), value), ((sort, Some(item.kind)), value)]
        })
        .collect()
}

impl State {
    fn log(&mut self, record: &Record) -> Result<(), PersistenceError> {
        match self.journal.as_mut() {
            Some(j) => j.append(record),
            None => Ok(()),
        }
    }

    /// Unique keys of `item` must be free or already owned by `item.id`.
    fn check_item_keys(&self, item: &ContentItem) -> Result<(), PersistenceError> {
        if let Some(owner) = self.by_url.get(&item.canonical_url) {
            if *owner != item.id {
                return Err(PersistenceError::Conflict {
                    constraint: "canonical_url",
                    key: item.canonical_url.clone(),
                });
            }
        }
        let ext = (item.source_kind, item.external_id.clone());
        if let Some(owner) = self.by_external.get(&ext) {
            if *owner != item.id {
                return Err(PersistenceError::Conflict {
                    constraint: "external_id",
                    key: format!("{}:{}", item.source_kind.as_str(), item.external_id),
                });
            }
        }
        Ok(())
    }

    fn unindex_item(&mut self, id: &str) {
        let Some(old) = self.items.get(id) else {
            return;
        };
        if self.by_url.get(&old.canonical_url).map(String::as_str) == Some(id) {
            self.by_url.remove(&old.canonical_url);
        }
        let ext = (old.source_kind, old.external_id.clone());
        if self.by_external.get(&ext).map(String::as_str) == Some(id) {
            self.by_external.remove(&ext);
        }
        if let Some(key) = CompositeKey::new(&old.title, old.author.as_deref(), old.source_kind) {
            if self.by_composite.get(&key).map(String::as_str) == Some(id) {
                self.by_composite.remove(&key);
            }
        }
        if old.active {
            for (slot, value) in rank_slots(old) {
                if let Some(ranked) = self.ranked.get_mut(&slot) {
                    ranked.remove(&(Reverse(value), old.id.clone()));
                }
            }
        }
    }

    fn put_item(&mut self, item: ContentItem) {
        self.unindex_item(&item.id);
        self.by_url
            .insert(item.canonical_url.clone(), item.id.clone());
        self.by_external
            .insert((item.source_kind, item.external_id.clone()), item.id.clone());
        if let Some(key) = CompositeKey::new(&item.title, item.author.as_deref(), item.source_kind) {
            // First writer keeps the composite slot.
            self.by_composite.entry(key).or_insert_with(|| item.id.clone());
        }
        if item.active {
            for (slot, value) in rank_slots(&item) {
                self.ranked
                    .entry(slot)
                    .or_default()
                    .insert((Reverse(value), item.id.clone()));
            }
        }
        self.items.insert(item.id.clone(), item);
    }

    fn put_source(&mut self, source: Source) {
        if let Some(old) = self.sources.get(&source.id) {
            if old.origin_url != source.origin_url {
                self.source_by_origin.remove(&old.origin_url);
            }
        }
        self.source_by_origin
            .insert(source.origin_url.clone(), source.id);
        self.next_source = self.next_source.max(source.id + 1);
        self.sources.insert(source.id, source);
    }

    fn remove_source(&mut self, id: SourceId) -> bool {
        match self.sources.remove(&id) {
            Some(old) => {
                self.source_by_origin.remove(&old.origin_url);
                true
            }
            None => false,
        }
    }

    fn put_run(&mut self, run: SyncRun) {
        if run.status == RunStatus::Running {
            self.running.insert(run.source_id, run.id);
        } else if self.running.get(&run.source_id) == Some(&run.id) {
            self.running.remove(&run.source_id);
        }
        self.next_run = self.next_run.max(run.id + 1);
        self.runs.insert(run.id, run);
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Source(s) => self.put_source(s),
            Record::DeleteSource(id) => {
                self.remove_source(id);
            }
            Record::Item(item) => self.put_item(item),
            Record::Run(run) => self.put_run(run),
        }
    }

    fn snapshot(&self) -> Vec<Record> {
        let mut out = Vec::with_capacity(self.sources.len() + self.items.len() + self.runs.len());
        out.extend(self.sources.values().cloned().map(Record::Source));
        let mut items: Vec<&ContentItem> = self.items.values().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out.extend(items.into_iter().cloned().map(Record::Item));
        out.extend(self.runs.values().cloned().map(Record::Run));
        out
    }
}

/// Single-process store. Cheap to share behind an `Arc`.
pub struct LocalStore {
    state: RwLock<State>,
}

impl LocalStore {
    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(State {
                next_source: 1,
                next_run: 1,
                ..State::default()
            }),
        }
    }

    /// Replay the journal at `path` (if any) and keep appending to it.
    ///
    /// Runs still marked running were cut off by a crash or kill; they are
    /// closed as failed so the source can sync again, and count as one
    /// failure in the source's health. Auto-disable stays with the
    /// orchestrator: the next failed run trips the threshold.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let (records, skipped) = journal::replay(path)
            .with_context(|| format!("replaying journal {}", path.display()))?;
        let mut state = State {
            next_source: 1,
            next_run: 1,
            ..State::default()
        };
        let replayed = records.len();
        for r in records {
            state.apply(r);
        }
        state.journal = Some(
            Journal::open(path).with_context(|| format!("opening journal {}", path.display()))?,
        );

        let interrupted: Vec<RunId> = state.running.values().copied().collect();
        for run_id in interrupted {
            if let Some(mut run) = state.runs.get(&run_id).cloned() {
                run.status = RunStatus::Failed;
                run.finished_at = Some(Utc::now());
                run.error = Some("interrupted".to_string());
                state.log(&Record::Run(run.clone()))?;
                if let Some(mut source) = state.sources.get(&run.source_id).cloned() {
                    source.consecutive_errors = source.consecutive_errors.saturating_add(1);
                    source.last_error = run.error.clone();
                    state.log(&Record::Source(source.clone()))?;
                    state.put_source(source);
                }
                state.put_run(run);
            }
        }

        tracing::info!(
            target: "store",
            path = %path.display(),
            records = replayed,
            skipped,
            sources = state.sources.len(),
            items = state.items.len(),
            "store opened"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Rewrite the journal to one record per live key.
    pub fn compact(&self) -> Result<(), PersistenceError> {
        let mut st = self.state.write();
        let records = st.snapshot();
        let count = records.len();
        if let Some(j) = st.journal.as_mut() {
            j.compact(records.into_iter())?;
            tracing::info!(target: "store", path = %j.path().display(), records = count, "journal compacted");
        }
        Ok(())
    }

    /// Compact and stop journaling. Later writes stay in memory only.
    pub fn shutdown(&self) -> Result<(), PersistenceError> {
        self.compact()?;
        self.state.write().journal = None;
        Ok(())
    }
}

impl IdentityIndex for LocalStore {
    fn by_canonical_url(&self, url: &str) -> Option<ContentId> {
        self.state.read().by_url.get(url).cloned()
    }

    fn by_external_id(&self, kind: SourceKind, external_id: &str) -> Option<ContentId> {
        self.state
            .read()
            .by_external
            .get(&(kind, external_id.to_string()))
            .cloned()
    }

    fn by_composite(&self, key: &CompositeKey) -> Option<CompositeHit> {
        let st = self.state.read();
        let item = st.by_composite.get(key).and_then(|id| st.items.get(id))?;
        Some(CompositeHit {
            id: item.id.clone(),
            source_id: item.source_id,
            external_id: item.external_id.clone(),
        })
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    fn get_item(&self, id: &str) -> Option<ContentItem> {
        self.state.read().items.get(id).cloned()
    }

    async fn insert_item(&self, item: ContentItem) -> Result<(), PersistenceError> {
        let mut st = self.state.write();
        if st.items.contains_key(&item.id) {
            return Err(PersistenceError::Conflict {
                constraint: "id",
                key: item.id,
            });
        }
        st.check_item_keys(&item)?;
        st.log(&Record::Item(item.clone()))?;
        st.put_item(item);
        Ok(())
    }

    async fn update_item(&self, item: ContentItem) -> Result<(), PersistenceError> {
        let mut st = self.state.write();
        if !st.items.contains_key(&item.id) {
            return Err(PersistenceError::NotFound(item.id));
        }
        st.check_item_keys(&item)?;
        st.log(&Record::Item(item.clone()))?;
        st.put_item(item);
        Ok(())
    }

    async fn modify_item(
        &self,
        id: &str,
        f: &mut (dyn for<'x> FnMut(&'x mut ContentItem) + Send),
    ) -> Result<ContentItem, PersistenceError> {
        let mut st = self.state.write();
        let mut item = st
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        f(&mut item);
        // The id is the primary key; a closure cannot move the record.
        item.id = id.to_string();
        st.check_item_keys(&item)?;
        st.log(&Record::Item(item.clone()))?;
        st.put_item(item.clone());
        Ok(item)
    }

    fn visit_ordered(
        &self,
        sort: SortKey,
        kind: Option<ContentKind>,
        visit: &mut dyn FnMut(i64, &ContentItem),
    ) {
        let st = self.state.read();
        let Some(ranked) = st.ranked.get(&(sort, kind)) else {
            return;
        };
        for (Reverse(value), id) in ranked {
            if let Some(item) = st.items.get(id) {
                visit(*value, item);
            }
        }
    }

    fn items_for_source(&self, source_id: SourceId) -> Vec<ContentId> {
        let st = self.state.read();
        let mut ids: Vec<ContentId> = st
            .items
            .values()
            .filter(|i| i.source_id == source_id)
            .map(|i| i.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn item_count(&self) -> usize {
        self.state.read().items.len()
    }
}

#[async_trait]
impl SourceStore for LocalStore {
    async fn create_source(
        &self,
        new: NewSource,
        now: DateTime<Utc>,
    ) -> Result<Source, PersistenceError> {
        let mut st = self.state.write();
        if st.source_by_origin.contains_key(&new.origin_url) {
            return Err(PersistenceError::Conflict {
                constraint: "origin_url",
                key: new.origin_url,
            });
        }
        let source = Source {
            id: st.next_source,
            name: new.name,
            kind: new.kind,
            origin_url: new.origin_url,
            category: new.category,
            enabled: true,
            consecutive_errors: 0,
            last_synced_at: None,
            last_error: None,
            created_at: now,
        };
        st.log(&Record::Source(source.clone()))?;
        st.put_source(source.clone());
        Ok(source)
    }

    fn get_source(&self, id: SourceId) -> Option<Source> {
        self.state.read().sources.get(&id).cloned()
    }

    fn list_sources(&self) -> Vec<Source> {
        self.state.read().sources.values().cloned().collect()
    }

    async fn update_source(&self, source: Source) -> Result<(), PersistenceError> {
        let mut st = self.state.write();
        if !st.sources.contains_key(&source.id) {
            return Err(PersistenceError::NotFound(format!("source {}", source.id)));
        }
        if let Some(owner) = st.source_by_origin.get(&source.origin_url) {
            if *owner != source.id {
                return Err(PersistenceError::Conflict {
                    constraint: "origin_url",
                    key: source.origin_url,
                });
            }
        }
        st.log(&Record::Source(source.clone()))?;
        st.put_source(source);
        Ok(())
    }

    async fn delete_source(&self, id: SourceId) -> Result<bool, PersistenceError> {
        let mut st = self.state.write();
        if !st.sources.contains_key(&id) {
            return Ok(false);
        }
        if st.running.contains_key(&id) {
            return Err(PersistenceError::RunInProgress(id));
        }
        st.log(&Record::DeleteSource(id))?;
        Ok(st.remove_source(id))
    }

    async fn begin_run(
        &self,
        source_id: SourceId,
        now: DateTime<Utc>,
    ) -> Result<SyncRun, PersistenceError> {
        let mut st = self.state.write();
        if !st.sources.contains_key(&source_id) {
            return Err(PersistenceError::NotFound(format!("source {source_id}")));
        }
        if st.running.contains_key(&source_id) {
            return Err(PersistenceError::RunInProgress(source_id));
        }
        let run = SyncRun {
            id: st.next_run,
            source_id,
            started_at: now,
            finished_at: None,
            counts: RunCounts::default(),
            status: RunStatus::Running,
            error: None,
        };
        st.log(&Record::Run(run.clone()))?;
        st.put_run(run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run: SyncRun) -> Result<(), PersistenceError> {
        let mut st = self.state.write();
        match st.runs.get(&run.id) {
            Some(existing) if existing.status == RunStatus::Running => {}
            Some(_) => {
                return Err(PersistenceError::Conflict {
                    constraint: "run_finished_once",
                    key: run.id.to_string(),
                })
            }
            None => return Err(PersistenceError::NotFound(format!("run {}", run.id))),
        }
        if run.status == RunStatus::Running {
            return Err(PersistenceError::Conflict {
                constraint: "run_terminal_status",
                key: run.id.to_string(),
            });
        }
        // Memory first: a journal failure must not leave the source locked.
        st.put_run(run.clone());
        st.log(&Record::Run(run))
    }

    fn runs_for(&self, source_id: SourceId, limit: usize) -> Vec<SyncRun> {
        self.state
            .read()
            .runs
            .values()
            .rev()
            .filter(|r| r.source_id == source_id)
            .take(limit)
            .cloned()
            .collect()
    }

    fn running_run(&self, source_id: SourceId) -> Option<SyncRun> {
        let st = self.state.read();
        st.running
            .get(&source_id)
            .and_then(|id| st.runs.get(id))
            .cloned()
    }
}
