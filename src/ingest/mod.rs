// src/ingest/mod.rs
pub mod fetch;
pub mod providers;
pub mod throttle;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::Credentials;
use crate::error::ConfigurationError;
use crate::ingest::providers::{
    channel::ChannelFeedAdapter, microblog::MicroblogAdapter, model_hub::ModelHubAdapter,
    repo_hub::RepositoryHubAdapter, syndication::SyndicationAdapter,
};
use crate::ingest::types::SourceAdapter;
use crate::model::SourceKind;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Entries yielded by adapters.");
        describe_counter!(
            "ingest_rejected_total",
            "Entries rejected at the adapter boundary."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Adapter level fetch/parse failures."
        );
        describe_counter!("ingest_cache_hits_total", "Upstream response cache hits.");
        describe_counter!(
            "ingest_throttled_total",
            "Upstream calls delayed by the rate limiter."
        );
        describe_histogram!("ingest_parse_ms", "Adapter parse time in milliseconds.");
        describe_counter!("sync_runs_total", "Finished sync runs by status.");
        describe_counter!("sync_items_saved_total", "Items inserted.");
        describe_counter!("sync_items_updated_total", "Items updated.");
        describe_counter!("sync_items_skipped_total", "Items unchanged.");
        describe_counter!("sync_items_errored_total", "Items that failed.");
        describe_counter!("sync_sources_disabled_total", "Sources auto-disabled.");
        describe_gauge!("sync_last_pass_ts", "Unix ts of the last scheduler pass.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

pub const TITLE_MAX_CHARS: usize = 300;
pub const SUMMARY_MAX_CHARS: usize = 500;
pub const BODY_MAX_CHARS: usize = 20_000;

/// Summary derived from a body when the upstream has none.
pub fn summarize(body: &str) -> String {
    normalize_text(body, SUMMARY_MAX_CHARS)
}

/// Parse an origin URL; only http(s) with a host is accepted.
pub fn validate_origin(url: &str) -> Result<reqwest::Url, ConfigurationError> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|e| ConfigurationError::MalformedUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigurationError::MalformedUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    if parsed.host_str().unwrap_or_default().is_empty() {
        return Err(ConfigurationError::MalformedUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(parsed)
}

pub(crate) fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    match OffsetDateTime::parse(ts.trim(), &Rfc2822) {
        Ok(odt) => DateTime::from_timestamp(odt.unix_timestamp(), 0),
        // chrono is more lenient with obsolete zone names ("GMT", "EST").
        Err(_) => DateTime::parse_from_rfc2822(ts.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

pub(crate) fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RSS dates are RFC 2822 in theory and RFC 3339 far too often in practice.
pub(crate) fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    parse_rfc2822(ts).or_else(|| parse_rfc3339(ts))
}

/// Adapter per source kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All built-in adapters.
    pub fn with_defaults(credentials: &Credentials) -> Self {
        Self::empty()
            .register(Arc::new(SyndicationAdapter))
            .register(Arc::new(ChannelFeedAdapter))
            .register(Arc::new(ModelHubAdapter::new(
                credentials.model_hub_token.clone(),
            )))
            .register(Arc::new(RepositoryHubAdapter::new(
                credentials.repository_hub_token.clone(),
            )))
            .register(Arc::new(MicroblogAdapter::new(
                credentials.microblog_token.clone(),
            )))
    }

    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b>!</p> &ldquo;ok&rdquo; ";
        assert_eq!(normalize_text(s, 100), "Hello, world ! \"ok\"");
    }

    #[test]
    fn normalize_text_caps_length() {
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    #[test]
    fn origin_validation_rejects_non_http() {
        assert!(validate_origin("https://hub.test/api/models").is_ok());
        assert!(matches!(
            validate_origin("ftp://hub.test/x"),
            Err(ConfigurationError::MalformedUrl { .. })
        ));
        assert!(validate_origin("not a url").is_err());
    }

    #[test]
    fn feed_dates_accept_both_formats() {
        let a = parse_feed_date("Tue, 10 Jun 2025 04:00:00 GMT").unwrap();
        let b = parse_feed_date("2025-06-10T04:00:00Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_feed_date("yesterday").is_none());
    }
}
