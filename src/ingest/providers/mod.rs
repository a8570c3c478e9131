// src/ingest/providers/mod.rs
pub mod channel;
pub mod microblog;
pub mod model_hub;
pub mod repo_hub;
pub mod syndication;
pub(crate) mod xml;
