// src/ingest/providers/repo_hub.rs
//! Code repository listings (search results or plain repository arrays).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{IngestError, ParseError};
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::types::{FetchContext, ItemStream, NormalizedItem, SourceAdapter};
use crate::ingest::{normalize_text, parse_rfc3339, summarize, TITLE_MAX_CHARS};
use crate::model::{KindMetrics, SourceKind};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Search { items: Vec<Value> },
    Bare(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Repo {
    id: u64,
    full_name: String,
    html_url: String,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    owner: Option<Owner>,
    created_at: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    language: Option<String>,
    #[serde(default)]
    archived: bool,
}

pub struct RepositoryHubAdapter {
    token: Option<String>,
}

impl RepositoryHubAdapter {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn parse_listing(json: &str) -> Result<ItemStream, ParseError> {
        let listing: Listing =
            serde_json::from_str(json).map_err(|e| ParseError::new("repository listing", e))?;
        let entries = match listing {
            Listing::Search { items } => items,
            Listing::Bare(v) => v,
        };
        Ok(Box::new(entries.into_iter().map(normalize_repo)))
    }
}

fn normalize_repo(value: Value) -> Result<NormalizedItem, ParseError> {
    let r: Repo =
        serde_json::from_value(value).map_err(|e| ParseError::new("repository entry", e))?;
    if !r.html_url.starts_with("http") {
        return Err(ParseError::new(
            "repository entry",
            format!("bad html_url {:?}", r.html_url),
        ));
    }

    let mut tags = r.topics;
    if let Some(lang) = r.language {
        tags.insert(0, lang);
    }
    if r.archived {
        tags.push("archived".to_string());
    }
    let description = r.description.unwrap_or_default();

    Ok(NormalizedItem {
        external_id: r.id.to_string(),
        title: normalize_text(&r.full_name, TITLE_MAX_CHARS),
        summary: summarize(&description),
        body: String::new(),
        canonical_url: r.html_url,
        author: r.owner.map(|o| o.login),
        published_at: r.created_at.as_deref().and_then(parse_rfc3339),
        media: Vec::new(),
        tags,
        metrics: KindMetrics::Repo {
            stars: r.stargazers_count,
            forks: r.forks_count,
        },
        trending: false,
    })
}

#[async_trait]
impl SourceAdapter for RepositoryHubAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::RepositoryHub
    }

    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError> {
        let req = FetchRequest::get(
            &ctx.source.origin_url,
            "application/vnd.github+json",
            ctx.timeout,
        )
        .with_bearer(self.token.clone());
        let body = fetcher.get(&req).await?;
        Ok(Self::parse_listing(&body)?)
    }
}
