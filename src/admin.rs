// src/admin.rs
//! Operations the admin collaborator drives: source CRUD, health, manual sync.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AdminError, PersistenceError, SyncError};
use crate::ingest::validate_origin;
use crate::model::{ContentItem, NewSource, RunStatus, Source, SourceId, SourceKind, SyncRun};
use crate::store::{ContentStore, SourceStore};
use crate::sync::{Orchestrator, PassReport};

/// Per-source view for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceHealth {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    pub enabled: bool,
    pub consecutive_errors: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_run_status: Option<RunStatus>,
    pub running: bool,
}

pub struct Admin {
    orchestrator: Arc<Orchestrator>,
}

impl Admin {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Origin is validated and stored in its parsed form.
    pub async fn create_source(&self, mut new: NewSource) -> Result<Source, AdminError> {
        new.origin_url = validate_origin(&new.origin_url)?.to_string();
        new.name = new.name.trim().to_string();
        new.category = new.category.trim().to_string();
        let source = self
            .orchestrator
            .store()
            .create_source(new, Utc::now())
            .await?;
        tracing::info!(target: "admin", source_id = source.id, kind = source.kind.as_str(), "source created");
        Ok(source)
    }

    /// Re-enabling clears the failure streak so the source is not disabled
    /// again by its next failure.
    pub async fn set_enabled(&self, id: SourceId, enabled: bool) -> Result<Source, AdminError> {
        let store = self.orchestrator.store();
        let mut source = store.get_source(id).ok_or(AdminError::UnknownSource(id))?;
        if source.enabled == enabled {
            return Ok(source);
        }
        source.enabled = enabled;
        if enabled {
            source.consecutive_errors = 0;
            source.last_error = None;
        }
        store.update_source(source.clone()).await?;
        Ok(source)
    }

    /// Removes the source and deactivates its items. Runs stay as audit trail.
    pub async fn delete_source(&self, id: SourceId) -> Result<usize, AdminError> {
        let store = self.orchestrator.store();
        match store.delete_source(id).await {
            Ok(true) => {}
            Ok(false) => return Err(AdminError::UnknownSource(id)),
            Err(PersistenceError::RunInProgress(_)) => {
                return Err(SyncError::AlreadyRunning(id).into())
            }
            Err(e) => return Err(e.into()),
        }
        let mut deactivated = 0usize;
        for item_id in store.items_for_source(id) {
            store
                .modify_item(&item_id, &mut |item: &mut ContentItem| item.active = false)
                .await?;
            deactivated += 1;
        }
        tracing::info!(target: "admin", source_id = id, deactivated, "source deleted");
        Ok(deactivated)
    }

    pub fn sources(&self) -> Vec<Source> {
        self.orchestrator.store().list_sources()
    }

    /// Newest first.
    pub fn runs_for(&self, id: SourceId, limit: usize) -> Vec<SyncRun> {
        self.orchestrator.store().runs_for(id, limit)
    }

    pub fn health(&self) -> Vec<SourceHealth> {
        let store = self.orchestrator.store();
        store
            .list_sources()
            .into_iter()
            .map(|s| {
                let last = store.runs_for(s.id, 1).into_iter().next();
                SourceHealth {
                    id: s.id,
                    running: last.as_ref().is_some_and(|r| r.status == RunStatus::Running),
                    last_run_status: last.map(|r| r.status),
                    name: s.name,
                    kind: s.kind,
                    enabled: s.enabled,
                    consecutive_errors: s.consecutive_errors,
                    last_synced_at: s.last_synced_at,
                    last_error: s.last_error,
                }
            })
            .collect()
    }

    pub async fn sync_now(&self, id: SourceId) -> Result<SyncRun, AdminError> {
        Ok(self.orchestrator.sync_source(id).await?)
    }

    pub async fn sync_all_eligible(&self) -> PassReport {
        self.orchestrator.run_pass(Utc::now()).await
    }
}
