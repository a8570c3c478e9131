// src/ingest/providers/model_hub.rs
//! Model hub listings (`/api/models`-style JSON).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{IngestError, ParseError};
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::types::{FetchContext, ItemStream, NormalizedItem, SourceAdapter};
use crate::ingest::{normalize_text, parse_rfc3339, validate_origin, TITLE_MAX_CHARS};
use crate::model::{KindMetrics, SourceKind};

/// Tolerant envelope: bare array or `{ "models": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<Value>),
    Wrapped { models: Vec<Value> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubModel {
    id: String,
    author: Option<String>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    trending_score: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "pipeline_tag")]
    pipeline_tag: Option<String>,
    created_at: Option<String>,
    last_modified: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub struct ModelHubAdapter {
    token: Option<String>,
}

impl ModelHubAdapter {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// `base` is `scheme://host` of the origin, used to build model pages.
    pub fn parse_listing(json: &str, base: &str) -> Result<ItemStream, ParseError> {
        let listing: Listing =
            serde_json::from_str(json).map_err(|e| ParseError::new("model hub listing", e))?;
        let entries = match listing {
            Listing::Bare(v) => v,
            Listing::Wrapped { models } => models,
        };
        let base = base.trim_end_matches('/').to_string();
        Ok(Box::new(
            entries.into_iter().map(move |v| normalize_model(v, &base)),
        ))
    }
}

fn normalize_model(value: Value, base: &str) -> Result<NormalizedItem, ParseError> {
    let m: HubModel =
        serde_json::from_value(value).map_err(|e| ParseError::new("model hub entry", e))?;
    let id = m.id.trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        return Err(ParseError::new("model hub entry", format!("bad id {:?}", m.id)));
    }

    let author = m
        .author
        .clone()
        .or_else(|| id.split_once('/').map(|(owner, _)| owner.to_string()));
    let summary = match (&m.description, &m.pipeline_tag) {
        (Some(d), _) if !d.trim().is_empty() => normalize_text(d, 500),
        (_, Some(p)) => format!("{p} model"),
        _ => String::new(),
    };

    Ok(NormalizedItem {
        external_id: id.to_string(),
        title: normalize_text(id, TITLE_MAX_CHARS),
        summary,
        body: String::new(),
        canonical_url: format!("{base}/{id}"),
        author,
        published_at: m
            .created_at
            .as_deref()
            .or(m.last_modified.as_deref())
            .and_then(parse_rfc3339),
        media: Vec::new(),
        tags: m.tags,
        metrics: KindMetrics::Model {
            downloads: m.downloads,
            likes: m.likes,
        },
        trending: m.trending_score.is_some_and(|s| s > 0.0),
    })
}

#[async_trait]
impl SourceAdapter for ModelHubAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ModelHub
    }

    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError> {
        let origin = validate_origin(&ctx.source.origin_url)?;
        let base = format!(
            "{}://{}",
            origin.scheme(),
            origin.host_str().unwrap_or_default()
        );
        let req = FetchRequest::get(origin.as_str(), "application/json", ctx.timeout)
            .with_bearer(self.token.clone());
        let body = fetcher.get(&req).await?;
        Ok(Self::parse_listing(&body, &base)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_listing_and_trending_flag() {
        let json = r#"{"models":[
            {"id":"org/a","downloads":10,"likes":2,"trendingScore":4},
            {"id":"org/b","downloads":1}
        ]}"#;
        let items: Vec<_> = ModelHubAdapter::parse_listing(json, "https://hub.test")
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert!(items[0].trending);
        assert!(!items[1].trending);
        assert_eq!(items[1].canonical_url, "https://hub.test/org/b");
        assert_eq!(items[1].author.as_deref(), Some("org"));
    }

    #[test]
    fn entry_without_id_is_rejected_alone() {
        let json = r#"[{"downloads":3},{"id":"x/y"}]"#;
        let out: Vec<_> = ModelHubAdapter::parse_listing(json, "https://hub.test/")
            .unwrap()
            .collect();
        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap().canonical_url, "https://hub.test/x/y");
    }

    #[test]
    fn non_listing_payload_fails_whole_document() {
        assert!(ModelHubAdapter::parse_listing(r#"{"error":"nope"}"#, "https://h.test").is_err());
    }
}
