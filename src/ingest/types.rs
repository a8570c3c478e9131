// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, IngestError, ParseError};
use crate::ingest::fetch::Fetcher;
use crate::model::{KindMetrics, Source, SourceKind};

/// Common envelope every adapter normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub canonical_url: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub media: Vec<String>,
    pub tags: Vec<String>,
    pub metrics: KindMetrics,
    pub trending: bool,
}

/// Lazy, finite sequence of entries. A bad entry does not end the sequence.
pub type ItemStream = Box<dyn Iterator<Item = Result<NormalizedItem, ParseError>> + Send>;

/// What the adapter needs to know about a sync attempt.
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    pub source: &'a Source,
    pub timeout: Duration,
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Cheap validation run before any network traffic.
    fn check(&self, source: &Source) -> Result<(), ConfigurationError> {
        crate::ingest::validate_origin(&source.origin_url).map(|_| ())
    }

    /// One upstream fetch; no retries, no state kept between calls.
    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError>;
}
