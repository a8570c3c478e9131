// src/ingest/providers/channel.rs
//! Video channel feeds: Atom with `yt:` and `media:` extensions.

use async_trait::async_trait;

use crate::error::{IngestError, ParseError};
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::providers::syndication::{atom_alternate_link, atom_author};
use crate::ingest::providers::xml::{parse_document, XmlNode};
use crate::ingest::types::{FetchContext, ItemStream, NormalizedItem, SourceAdapter};
use crate::ingest::{normalize_text, parse_rfc3339, summarize, BODY_MAX_CHARS, TITLE_MAX_CHARS};
use crate::model::{KindMetrics, SourceKind};

pub struct ChannelFeedAdapter;

impl ChannelFeedAdapter {
    pub fn parse_feed(xml: &str) -> Result<ItemStream, ParseError> {
        let root = parse_document(xml)?;
        if root.name != "feed" {
            return Err(ParseError::new(
                "channel feed",
                format!("expected <feed>, got <{}>", root.name),
            ));
        }
        let entries: Vec<XmlNode> = root.children_named("entry").cloned().collect();
        Ok(Box::new(entries.into_iter().map(|e| normalize_entry(&e))))
    }
}

#[async_trait]
impl SourceAdapter for ChannelFeedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ChannelFeed
    }

    async fn fetch(
        &self,
        ctx: FetchContext<'_>,
        fetcher: &dyn Fetcher,
    ) -> Result<ItemStream, IngestError> {
        let req = FetchRequest::get(&ctx.source.origin_url, "application/atom+xml", ctx.timeout);
        let body = fetcher.get(&req).await?;
        Ok(Self::parse_feed(&body)?)
    }
}

fn count_attr(node: Option<&XmlNode>, attr: &str) -> u64 {
    node.and_then(|n| n.attr(attr))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

fn normalize_entry(entry: &XmlNode) -> Result<NormalizedItem, ParseError> {
    let video_id = entry
        .child_text("videoId")
        .or_else(|| entry.child_text("id"))
        .ok_or_else(|| ParseError::new("channel entry", "no video id"))?
        .to_string();
    let canonical_url = atom_alternate_link(entry)
        .ok_or_else(|| ParseError::new("channel entry", "no alternate link"))?;

    let group = entry.child("group");
    let description = group
        .and_then(|g| g.child_text("description"))
        .unwrap_or_default();
    let title_raw = entry
        .child_text("title")
        .or_else(|| group.and_then(|g| g.child_text("title")))
        .ok_or_else(|| ParseError::new("channel entry", "no title"))?;

    let community = group.and_then(|g| g.child("community"));
    let views = count_attr(community.and_then(|c| c.child("statistics")), "views");
    let likes = count_attr(community.and_then(|c| c.child("starRating")), "count");

    let media = group
        .into_iter()
        .flat_map(|g| g.children_named("thumbnail").chain(g.children_named("content")))
        .filter_map(|m| m.attr("url"))
        .map(str::to_string)
        .collect();

    Ok(NormalizedItem {
        external_id: video_id,
        title: normalize_text(title_raw, TITLE_MAX_CHARS),
        summary: summarize(description),
        body: normalize_text(description, BODY_MAX_CHARS),
        canonical_url,
        author: atom_author(entry),
        published_at: entry.child_text("published").and_then(parse_rfc3339),
        media,
        tags: Vec::new(),
        metrics: KindMetrics::Video { views, likes },
        trending: false,
    })
}
