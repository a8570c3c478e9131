// src/ingest/providers/syndication.rs
//! RSS 2.0, RSS 1.0 (RDF) and Atom article feeds.

use async_trait::async_trait;
use metrics::histogram;

use crate::error::{IngestError, ParseError};
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::providers::xml::{parse_document, XmlNode};
use crate::ingest::types::{FetchContext, ItemStream, NormalizedItem, SourceAdapter};
use crate::ingest::{
    normalize_text, parse_feed_date, parse_rfc3339, summarize, BODY_MAX_CHARS, TITLE_MAX_CHARS,
};
use crate::model::{KindMetrics, SourceKind};

const ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.5";

pub struct SyndicationAdapter;

impl SyndicationAdapter {
    /// Parse a full feed document. Entries are normalized lazily.
    pub fn parse_feed(xml: &str) -> Result<ItemStream, ParseError> {
        let t0 = std::time::Instant::now();
        let root = parse_document(&scrub_html_entities_for_xml(xml))?;

        let entries: Vec<XmlNode> = match root.name.as_str() {
            "rss" => root
                .child("channel")
                .ok_or_else(|| ParseError::new("rss", "missing <channel>"))?
                .children_named("item")
                .cloned()
                .collect(),
            // RSS 1.0 keeps items next to the channel.
            "RDF" => root.children_named("item").cloned().collect(),
            "feed" => root.children_named("entry").cloned().collect(),
            other => {
                return Err(ParseError::new(
                    "syndication",
                    format!("unrecognized root element <{other}>"),
                ))
            }
        };
        let atom = root.name == "feed";

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);

        Ok(Box::new(entries.into_iter().map(move |entry| {
            if atom {
                normalize_atom_entry(&entry)
            } else {
                normalize_rss_item(&entry)
            }
        })))
    }
}

#[async_trait]
impl SourceAdapter for SyndicationAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Syndication
    }

    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError> {
        let req = FetchRequest::get(&ctx.source.origin_url, ACCEPT, ctx.timeout);
        let body = fetcher.get(&req).await?;
        Ok(Self::parse_feed(&body)?)
    }
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn media_refs(entry: &XmlNode) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |url: Option<&str>| {
        if let Some(u) = url.map(str::trim).filter(|u| is_http(u)) {
            if !out.iter().any(|x: &String| x == u) {
                out.push(u.to_string());
            }
        }
    };
    for e in entry.children_named("enclosure") {
        push(e.attr("url"));
    }
    for name in ["content", "thumbnail"] {
        for e in entry.children_named(name) {
            push(e.attr("url"));
        }
    }
    if let Some(group) = entry.child("group") {
        for e in group.children_named("thumbnail") {
            push(e.attr("url"));
        }
    }
    out
}

fn title_or_fallback(title: Option<&str>, summary: &str) -> Option<String> {
    let t = normalize_text(title.unwrap_or_default(), TITLE_MAX_CHARS);
    if !t.is_empty() {
        return Some(t);
    }
    let s = normalize_text(summary, 120);
    (!s.is_empty()).then_some(s)
}

fn normalize_rss_item(item: &XmlNode) -> Result<NormalizedItem, ParseError> {
    let link = item
        .children_named("link")
        .find_map(|l| l.text().or_else(|| l.attr("href")))
        .map(str::to_string);
    let guid = item.child_text("guid").map(str::to_string);

    let canonical_url = link
        .clone()
        .or_else(|| guid.clone().filter(|g| is_http(g)))
        .ok_or_else(|| ParseError::new("rss item", "no link or permalink guid"))?;
    let external_id = guid.unwrap_or_else(|| canonical_url.clone());

    let description = item.child_text("description").unwrap_or_default();
    let encoded = item.child_text("encoded");
    let summary = summarize(description);
    let body = normalize_text(encoded.unwrap_or(description), BODY_MAX_CHARS);
    let title = title_or_fallback(item.child_text("title"), &body)
        .ok_or_else(|| ParseError::new("rss item", "no title and no text"))?;

    let author = item
        .child_text("creator")
        .or_else(|| item.child_text("author"))
        .map(|a| normalize_text(a, 200))
        .filter(|a| !a.is_empty());

    let published_at = item
        .child_text("pubDate")
        .or_else(|| item.child_text("date"))
        .and_then(parse_feed_date);

    let tags = item
        .children_named("category")
        .filter_map(XmlNode::text)
        .map(|c| normalize_text(c, 80))
        .filter(|c| !c.is_empty())
        .collect();

    // `<comments>` is a URL in plain RSS and a count in `slash:comments`.
    let comments = item
        .children_named("comments")
        .filter_map(XmlNode::text)
        .find_map(|c| c.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(NormalizedItem {
        external_id,
        title,
        summary,
        body,
        canonical_url,
        author,
        published_at,
        media: media_refs(item),
        tags,
        metrics: KindMetrics::Article { comments },
        trending: false,
    })
}

/// `rel="alternate"` (or no rel) link of an Atom entry.
pub(crate) fn atom_alternate_link(entry: &XmlNode) -> Option<String> {
    entry
        .children_named("link")
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .and_then(|l| l.attr("href").or_else(|| l.text()))
        .map(str::to_string)
}

pub(crate) fn atom_author(entry: &XmlNode) -> Option<String> {
    entry
        .child("author")
        .and_then(|a| a.child_text("name").or_else(|| a.text()))
        .map(|a| normalize_text(a, 200))
        .filter(|a| !a.is_empty())
}

fn normalize_atom_entry(entry: &XmlNode) -> Result<NormalizedItem, ParseError> {
    let link = atom_alternate_link(entry);
    let id = entry.child_text("id").map(str::to_string);
    let canonical_url = link
        .or_else(|| id.clone().filter(|i| is_http(i)))
        .ok_or_else(|| ParseError::new("atom entry", "no alternate link"))?;
    let external_id = id.unwrap_or_else(|| canonical_url.clone());

    let summary_raw = entry.child_text("summary").unwrap_or_default();
    let content_raw = entry.child_text("content");
    let body = normalize_text(content_raw.unwrap_or(summary_raw), BODY_MAX_CHARS);
    let summary = if summary_raw.is_empty() {
        summarize(&body)
    } else {
        summarize(summary_raw)
    };
    let title = title_or_fallback(entry.child_text("title"), &body)
        .ok_or_else(|| ParseError::new("atom entry", "no title and no text"))?;

    let published_at = entry
        .child_text("published")
        .or_else(|| entry.child_text("updated"))
        .and_then(parse_rfc3339);

    let tags = entry
        .children_named("category")
        .filter_map(|c| c.attr("term").or_else(|| c.text()))
        .map(|c| normalize_text(c, 80))
        .filter(|c| !c.is_empty())
        .collect();

    Ok(NormalizedItem {
        external_id,
        title,
        summary,
        body,
        canonical_url,
        author: atom_author(entry),
        published_at,
        media: media_refs(entry),
        tags,
        metrics: KindMetrics::Article { comments: 0 },
        trending: false,
    })
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
