// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod admin;
pub mod api;
pub mod config;
pub mod dedup;
pub mod engagement;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod query;
pub mod scoring;
pub mod store;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::admin::Admin;
pub use crate::api::router;
pub use crate::config::EngineConfig;
pub use crate::engagement::Engagement;
pub use crate::store::LocalStore;
pub use crate::sync::{Orchestrator, SyncSettings};
