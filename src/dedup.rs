//! Identity resolution for incoming items.
//!
//! Rules in precedence order, first match wins:
//! 1. canonical URL
//! 2. external id + source kind
//! 3. (title, author, source kind), only when the item has an author
//!
//! Rule 3 catches feeds that rotate tracking parameters or mirrors; it can
//! merge two distinct posts with identical title and author. Within one
//! source a composite hit carrying a different external id is a distinct
//! entry, not a duplicate.

use std::fmt;

use crate::error::IdentityAmbiguity;
use crate::ingest::types::NormalizedItem;
use crate::model::{ContentId, SourceId, SourceKind};

/// Read side of the store used by [`resolve`].
pub trait IdentityIndex {
    fn by_canonical_url(&self, url: &str) -> Option<ContentId>;
    fn by_external_id(&self, kind: SourceKind, external_id: &str) -> Option<ContentId>;
    fn by_composite(&self, key: &CompositeKey) -> Option<CompositeHit>;
}

/// Record owning a composite slot, with what rule 3 needs to veto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeHit {
    pub id: ContentId,
    pub source_id: SourceId,
    pub external_id: String,
}

/// Where an incoming item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub source_id: SourceId,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    New,
    Match(ContentId),
}

/// Case-folded, whitespace-collapsed (title, author, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub title: String,
    pub author: String,
    pub kind: SourceKind,
}

impl CompositeKey {
    pub fn new(title: &str, author: Option<&str>, kind: SourceKind) -> Option<Self> {
        let title = fold(title);
        let author = fold(author?);
        if title.is_empty() || author.is_empty() {
            return None;
        }
        Some(Self {
            title,
            author,
            kind,
        })
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind.as_str(), self.author, self.title)
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src"];

/// Canonical form of an item URL: lowercase scheme/host, no fragment, no
/// tracking parameters, no trailing slash. Unparseable input is only trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = reqwest::Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut out = url.to_string();
    // Url keeps a bare "/" path for origins; drop it for a stable key.
    if url.path() == "/" && url.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Decide whether `item` is already stored. Expects `item.canonical_url`
/// to be canonicalized.
pub fn resolve<I: IdentityIndex + ?Sized>(
    item: &NormalizedItem,
    origin: Origin,
    index: &I,
) -> Resolution {
    let by_url = index.by_canonical_url(&item.canonical_url);
    let by_ext = index.by_external_id(origin.kind, &item.external_id);
    let by_composite = CompositeKey::new(&item.title, item.author.as_deref(), origin.kind)
        .and_then(|key| index.by_composite(&key))
        .filter(|hit| hit.source_id != origin.source_id || hit.external_id == item.external_id)
        .map(|hit| hit.id);

    let mut hits = [by_url, by_ext, by_composite].into_iter().flatten();
    let Some(chosen) = hits.next() else {
        return Resolution::New;
    };

    let mut others: Vec<ContentId> = hits.filter(|id| *id != chosen).collect();
    if !others.is_empty() {
        others.dedup();
        let amb = IdentityAmbiguity {
            canonical_url: item.canonical_url.clone(),
            chosen: chosen.clone(),
            others,
        };
        tracing::warn!(target: "dedup", error = %amb, "identity ambiguity resolved by precedence");
    }
    Resolution::Match(chosen)
}
