// src/query.rs
//! Presentation reads: filtered, sorted, paginated active items.

use serde::{Deserialize, Serialize};

use crate::model::{ContentItem, ContentKind, SourceId};
use crate::store::{ContentStore, SortKey};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentQuery {
    pub kind: Option<ContentKind>,
    pub category: Option<String>,
    pub source_id: Option<SourceId>,
    #[serde(default)]
    pub sort: SortKey,
    pub limit: Option<usize>,
    /// Ignored when `cursor` is set.
    #[serde(default)]
    pub offset: usize,
    /// Opaque `next_cursor` from a previous page.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<ContentItem>,
    /// Matches across all pages.
    pub total: usize,
    pub next_cursor: Option<String>,
}

/// Position after which a page starts: `(sort value, id)` of its last row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cursor {
    value: i64,
    id: String,
}

impl Cursor {
    fn encode(&self) -> String {
        format!("{}:{}", self.value, self.id)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (value, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            value: value.parse().ok()?,
            id: id.to_string(),
        })
    }

    /// Rows are ordered value desc, id asc.
    fn is_before(&self, value: i64, id: &str) -> bool {
        value < self.value || (value == self.value && id > self.id.as_str())
    }
}

enum Start {
    Offset(usize),
    After(Cursor),
}

/// One pass over the store's rank index: filters, counts and cuts the page
/// without materializing non-matching rows.
pub fn query<S: ContentStore + ?Sized>(store: &S, q: &ContentQuery) -> Page {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let category = q.category.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let start = match q.cursor.as_deref().map(Cursor::decode) {
        Some(Some(cursor)) => Start::After(cursor),
        Some(None) => {
            tracing::debug!(target: "query", cursor = ?q.cursor, "ignoring malformed cursor");
            Start::Offset(0)
        }
        None => Start::Offset(q.offset),
    };

    let mut total = 0usize;
    let mut page: Vec<(i64, ContentItem)> = Vec::with_capacity(limit);
    let mut more = false;
    store.visit_ordered(q.sort, q.kind, &mut |value, item| {
        if !item.active
            || !q.source_id.map_or(true, |s| item.source_id == s)
            || !category.map_or(true, |c| item.category.eq_ignore_ascii_case(c))
        {
            return;
        }
        let position = total;
        total += 1;
        let in_window = match &start {
            Start::Offset(n) => position >= *n,
            Start::After(cursor) => cursor.is_before(value, &item.id),
        };
        if !in_window {
            return;
        }
        if page.len() < limit {
            page.push((value, item.clone()));
        } else {
            more = true;
        }
    });

    let next_cursor = if more {
        page.last().map(|(value, item)| {
            Cursor {
                value: *value,
                id: item.id.clone(),
            }
            .encode()
        })
    } else {
        None
    };

    Page {
        items: page.into_iter().map(|(_, item)| item).collect(),
        total,
        next_cursor,
    }
}
