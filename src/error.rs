//! Error taxonomy shared by adapters, the store and the sync orchestrator.
//!
//! Only [`SyncError`] ever reaches a caller of the orchestrator; everything
//! else is caught at item or source granularity and turned into run
//! statistics or source health.

use std::time::Duration;

use crate::model::{ContentId, SourceId, SourceKind};

/// Network level failure while talking to an upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} timed out after {budget:?}")]
    Timeout { url: String, budget: Duration },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Upstream payload that does not have the shape the adapter expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{context}: {message}")]
pub struct ParseError {
    pub context: String,
    pub message: String,
}

impl ParseError {
    pub fn new(context: impl Into<String>, message: impl ToString) -> Self {
        Self {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// Source descriptor that can never sync as configured. Not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("malformed origin url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },
    #[error("missing credential {0}")]
    MissingCredential(&'static str),
    #[error("no adapter registered for {0:?}")]
    NoAdapter(SourceKind),
}

/// Everything an adapter can fail with at source level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Identity rules pointed at different stored records. Resolved by rule
/// precedence and only ever logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("identity rules disagree for {canonical_url}: chose {chosen}, also matched {others:?}")]
pub struct IdentityAmbiguity {
    pub canonical_url: String,
    pub chosen: ContentId,
    pub others: Vec<ContentId>,
}

/// A single write into the store failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("unique constraint {constraint} violated by {key}")]
    Conflict { constraint: &'static str, key: String },
    #[error("record {0} not found")]
    NotFound(String),
    #[error("source {0} already has a running sync")]
    RunInProgress(SourceId),
    #[error("journal write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Orchestrator refused or could not bookkeep a sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("source {0} is already syncing")]
    AlreadyRunning(SourceId),
    #[error("source {0} does not exist")]
    UnknownSource(SourceId),
    #[error("source {0} is disabled")]
    Disabled(SourceId),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Admin operation rejected or failed.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("invalid source: {0}")]
    Invalid(#[from] ConfigurationError),
    #[error("source {0} does not exist")]
    UnknownSource(SourceId),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}
