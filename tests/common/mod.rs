// tests/common/mod.rs
//
// Shared harness: an in-memory store, a scripted upstream and helpers to
// build feeds and sources.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use feedrank::error::FetchError;
use feedrank::ingest::fetch::{FetchRequest, Fetcher};
use feedrank::ingest::AdapterRegistry;
use feedrank::model::{NewSource, Source, SourceKind};
use feedrank::store::{SourceStore, Storage};
use feedrank::{LocalStore, Orchestrator, SyncSettings};

/// Upstream that answers from per-URL scripts. The last scripted answer
/// for a URL repeats forever.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, body: impl Into<String>) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(body.into()));
    }

    pub fn fail(&self, url: &str, err: FetchError) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, req: &FetchRequest) -> Result<String, FetchError> {
        self.calls.lock().push(req.clone());
        let mut scripts = self.scripts.lock();
        let Some(queue) = scripts.get_mut(&req.url) else {
            return Err(FetchError::Status {
                url: req.url.clone(),
                status: 404,
            });
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

pub struct RssEntry<'a> {
    pub guid: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub comments: u64,
}

pub fn entry<'a>(guid: &'a str, title: &'a str, url: &'a str, comments: u64) -> RssEntry<'a> {
    RssEntry {
        guid,
        title,
        url,
        comments,
    }
}

/// Minimal RSS 2.0 document.
pub fn rss(entries: &[RssEntry<'_>]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0"?><rss version="2.0" xmlns:slash="http://purl.org/rss/1.0/modules/slash/"><channel><title>t</title>"#,
    );
    for e in entries {
        out.push_str(&format!(
            "<item><title>{}</title><link>{}</link><guid isPermaLink=\"false\">{}</guid>\
             <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>\
             <description>about {}</description><slash:comments>{}</slash:comments></item>",
            e.title, e.url, e.guid, e.title, e.comments
        ));
    }
    out.push_str("</channel></rss>");
    out
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        workers: 2,
        ..SyncSettings::default()
    }
}

pub fn orchestrator(
    store: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    settings: SyncSettings,
) -> Arc<Orchestrator> {
    let creds = feedrank::config::Credentials {
        microblog_token: Some("test-token".into()),
        ..Default::default()
    };
    Arc::new(Orchestrator::new(
        store,
        fetcher,
        AdapterRegistry::with_defaults(&creds),
        settings,
    ))
}

pub fn memory_harness() -> (Arc<LocalStore>, Arc<ScriptedFetcher>, Arc<Orchestrator>) {
    let store = Arc::new(LocalStore::in_memory());
    let fetcher = ScriptedFetcher::new();
    let orch = orchestrator(store.clone(), fetcher.clone(), settings());
    (store, fetcher, orch)
}

pub async fn add_source<S: SourceStore + ?Sized>(store: &S, kind: SourceKind, url: &str) -> Source {
    store
        .create_source(
            NewSource {
                name: format!("{} {}", kind.as_str(), url),
                kind,
                origin_url: url.to_string(),
                category: "engineering".to_string(),
            },
            Utc::now(),
        )
        .await
        .expect("create source")
}
