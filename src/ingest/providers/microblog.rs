// src/ingest/providers/microblog.rs
//! Microblog status timelines (Mastodon-style JSON). Reposts are unwrapped to
//! the original status so the same post never lands twice under two ids.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigurationError, IngestError, ParseError};
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::types::{FetchContext, ItemStream, NormalizedItem, SourceAdapter};
use crate::ingest::{normalize_text, parse_rfc3339, summarize, validate_origin, BODY_MAX_CHARS};
use crate::model::{KindMetrics, Source, SourceKind};

const TITLE_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
struct Account {
    acct: String,
    #[serde(default)]
    followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: Option<String>,
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    url: Option<String>,
    uri: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    spoiler_text: String,
    created_at: Option<String>,
    #[serde(default)]
    favourites_count: u64,
    #[serde(default)]
    reblogs_count: u64,
    account: Account,
    #[serde(default)]
    media_attachments: Vec<Attachment>,
    #[serde(default)]
    tags: Vec<Tag>,
    reblog: Option<Box<Status>>,
}

pub struct MicroblogAdapter {
    token: Option<String>,
}

impl MicroblogAdapter {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// `trending` marks every status of the listing (trend endpoints).
    pub fn parse_timeline(json: &str, trending: bool) -> Result<ItemStream, ParseError> {
        let entries: Vec<Value> =
            serde_json::from_str(json).map_err(|e| ParseError::new("microblog timeline", e))?;
        Ok(Box::new(
            entries.into_iter().map(move |v| normalize_status(v, trending)),
        ))
    }
}

fn normalize_status(value: Value, trending: bool) -> Result<NormalizedItem, ParseError> {
    let mut s: Status =
        serde_json::from_value(value).map_err(|e| ParseError::new("microblog status", e))?;
    if let Some(original) = s.reblog.take() {
        s = *original;
    }

    let canonical_url = s
        .url
        .clone()
        .or_else(|| s.uri.clone())
        .filter(|u| u.starts_with("http"))
        .ok_or_else(|| ParseError::new("microblog status", "no public url"))?;

    let body = normalize_text(&s.content, BODY_MAX_CHARS);
    let headline = if s.spoiler_text.trim().is_empty() {
        &body
    } else {
        &s.spoiler_text
    };
    let title = normalize_text(headline, TITLE_CHARS);
    if title.is_empty() && s.media_attachments.is_empty() {
        return Err(ParseError::new("microblog status", "empty status"));
    }

    let media = s
        .media_attachments
        .iter()
        .filter_map(|a| a.url.clone().or_else(|| a.preview_url.clone()))
        .collect();

    Ok(NormalizedItem {
        external_id: s.id,
        title,
        summary: summarize(&body),
        body,
        canonical_url,
        author: Some(s.account.acct),
        published_at: s.created_at.as_deref().and_then(parse_rfc3339),
        media,
        tags: s.tags.into_iter().map(|t| t.name).collect(),
        metrics: KindMetrics::Post {
            followers: s.account.followers_count,
            likes: s.favourites_count,
            reposts: s.reblogs_count,
        },
        trending,
    })
}

#[async_trait]
impl SourceAdapter for MicroblogAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Microblog
    }

    fn check(&self, source: &Source) -> Result<(), ConfigurationError> {
        validate_origin(&source.origin_url)?;
        if self.token.as_deref().unwrap_or_default().trim().is_empty() {
            return Err(ConfigurationError::MissingCredential("microblog_token"));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError> {
        let origin = validate_origin(&ctx.source.origin_url)?;
        let trending = origin.path().contains("/trends");
        let req = FetchRequest::get(origin.as_str(), "application/json", ctx.timeout)
            .with_bearer(self.token.clone());
        let body = fetcher.get(&req).await?;
        Ok(Self::parse_timeline(&body, trending)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reblog_is_unwrapped_to_original() {
        let json = r#"[{
            "id":"2","url":"https://social.test/@b/2","content":"","account":{"acct":"b"},
            "reblog":{"id":"1","url":"https://social.test/@a/1","content":"<p>hi there</p>",
                      "favourites_count":3,"account":{"acct":"a","followers_count":10}}
        }]"#;
        let item = MicroblogAdapter::parse_timeline(json, false)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(item.external_id, "1");
        assert_eq!(item.author.as_deref(), Some("a"));
        assert_eq!(item.title, "hi there");
        assert_eq!(
            item.metrics,
            KindMetrics::Post {
                followers: 10,
                likes: 3,
                reposts: 0
            }
        );
    }

    #[test]
    fn missing_token_is_configuration_error() {
        let src = Source {
            id: 1,
            name: "m".into(),
            kind: SourceKind::Microblog,
            origin_url: "https://social.test/api/v1/timelines/tag/rust".into(),
            category: String::new(),
            enabled: true,
            consecutive_errors: 0,
            last_synced_at: None,
            last_error: None,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            MicroblogAdapter::new(None).check(&src),
            Err(ConfigurationError::MissingCredential("microblog_token"))
        );
        assert!(MicroblogAdapter::new(Some("t".into())).check(&src).is_ok());
    }
}
