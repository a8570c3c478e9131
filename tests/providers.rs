// tests/providers.rs
//
// Adapters against recorded upstream payloads.

use chrono::{TimeZone, Utc};

use feedrank::ingest::providers::{
    channel::ChannelFeedAdapter, microblog::MicroblogAdapter, model_hub::ModelHubAdapter,
    repo_hub::RepositoryHubAdapter, syndication::SyndicationAdapter,
};
use feedrank::ingest::types::{ItemStream, NormalizedItem};
use feedrank::model::KindMetrics;

const RSS: &str = include_str!("fixtures/syndication_rss.xml");
const ATOM: &str = include_str!("fixtures/syndication_atom.xml");
const CHANNEL: &str = include_str!("fixtures/channel_feed.xml");
const MODELS: &str = include_str!("fixtures/model_hub.json");
const REPOS: &str = include_str!("fixtures/repo_hub.json");
const STATUSES: &str = include_str!("fixtures/microblog.json");

fn split(stream: ItemStream) -> (Vec<NormalizedItem>, usize) {
    let mut ok = Vec::new();
    let mut bad = 0;
    for r in stream {
        match r {
            Ok(item) => ok.push(item),
            Err(_) => bad += 1,
        }
    }
    (ok, bad)
}

#[test]
fn rss_fixture_normalizes_and_rejects_orphan() {
    let (items, bad) = split(SyndicationAdapter::parse_feed(RSS).expect("rss parses"));
    assert_eq!(items.len(), 3);
    assert_eq!(bad, 1);

    let first = &items[0];
    assert_eq!(first.external_id, "sw-1001");
    assert_eq!(first.title, "Zero-copy parsing in practice");
    assert_eq!(first.author.as_deref(), Some("Ada Park"));
    assert_eq!(first.summary, "Borrowing from the input buffer & why it pays off.");
    assert!(first.body.ends_with("A longer body."));
    assert_eq!(first.tags, vec!["rust".to_string(), "parsing".to_string()]);
    assert_eq!(first.media, vec!["https://cdn.systems.test/zero-copy.png".to_string()]);
    assert_eq!(first.metrics, KindMetrics::Article { comments: 42 });
    assert_eq!(
        first.published_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 10, 4, 0, 0).unwrap())
    );

    let second = &items[1];
    assert_eq!(second.title, "Async cancellation \"gotchas\"");
    assert_eq!(second.metrics, KindMetrics::Article { comments: 0 });
    assert_eq!(second.media, vec!["https://cdn.systems.test/cancel.jpg".to_string()]);

    // No guid: the link is the identity. RFC 3339 dates are accepted too.
    let third = &items[2];
    assert_eq!(third.external_id, "https://blog.systems.test/posts/allocators");
    assert_eq!(
        third.published_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 12, 8, 0, 0).unwrap())
    );
}

#[test]
fn atom_fixture_uses_alternate_link_and_strips_markup() {
    let (items, bad) = split(SyndicationAdapter::parse_feed(ATOM).expect("atom parses"));
    assert_eq!(bad, 0);
    assert_eq!(items.len(), 2);

    let lowering = &items[0];
    assert_eq!(lowering.title, "Lowering match expressions");
    assert_eq!(lowering.canonical_url, "https://compiler.test/2025/06/lowering-match");
    assert_eq!(lowering.external_id, "tag:compiler.test,2025:lowering-match");
    assert_eq!(lowering.author.as_deref(), Some("Ines Duarte"));
    assert_eq!(lowering.tags, vec!["compilers".to_string()]);
    assert_eq!(lowering.summary, "Decision trees and jump tables.");

    let regalloc = &items[1];
    assert_eq!(regalloc.canonical_url, "https://compiler.test/2025/05/regalloc");
    assert_eq!(
        regalloc.published_at,
        Some(Utc.with_ymd_and_hms(2025, 5, 30, 6, 0, 0).unwrap())
    );
}

#[test]
fn channel_fixture_reads_statistics() {
    let (items, bad) = split(ChannelFeedAdapter::parse_feed(CHANNEL).expect("channel parses"));
    assert_eq!(bad, 0);
    assert_eq!(items.len(), 2);

    let talk = &items[0];
    assert_eq!(talk.external_id, "abc123XYZ");
    assert_eq!(talk.canonical_url, "https://video.test/watch?v=abc123XYZ");
    assert_eq!(talk.metrics, KindMetrics::Video { views: 48_211, likes: 1_520 });
    assert_eq!(talk.summary, "B-trees, WAL and compaction in one hour.");
    assert!(talk
        .media
        .contains(&"https://img.video.test/abc123XYZ/hq.jpg".to_string()));

    assert_eq!(items[1].metrics, KindMetrics::Video { views: 0, likes: 0 });
}

#[test]
fn model_hub_fixture_builds_urls_and_rejects_bad_ids() {
    let stream = ModelHubAdapter::parse_listing(MODELS, "https://hub.test/").expect("listing");
    let (items, bad) = split(stream);
    assert_eq!(items.len(), 2);
    assert_eq!(bad, 2);

    let coder = &items[0];
    assert_eq!(coder.canonical_url, "https://hub.test/acme-labs/tiny-coder-1b");
    assert!(coder.trending);
    assert_eq!(
        coder.metrics,
        KindMetrics::Model {
            downloads: 1_000_000,
            likes: 500
        }
    );

    let vision = &items[1];
    assert_eq!(vision.author.as_deref(), Some("solo"));
    assert!(!vision.trending);
    assert_eq!(vision.summary, "image-classification model");
    assert!(vision.published_at.is_some());
}

#[test]
fn repo_hub_fixture_maps_search_envelope() {
    let (items, bad) = split(RepositoryHubAdapter::parse_listing(REPOS).expect("listing"));
    assert_eq!(bad, 0);
    assert_eq!(items.len(), 2);

    let q = &items[0];
    assert_eq!(q.external_id, "9001");
    assert_eq!(q.title, "ferris/fastq");
    assert_eq!(q.author.as_deref(), Some("ferris"));
    assert_eq!(q.tags[0], "Rust");
    assert_eq!(q.metrics, KindMetrics::Repo { stars: 12_500, forks: 640 });

    let legacy = &items[1];
    assert_eq!(legacy.summary, "");
    assert_eq!(legacy.tags, vec!["archived".to_string()]);
}

#[test]
fn microblog_fixture_unwraps_reblogs() {
    let (items, bad) = split(MicroblogAdapter::parse_timeline(STATUSES, true).expect("timeline"));
    assert_eq!(items.len(), 2);
    assert_eq!(bad, 1);

    let own = &items[0];
    assert_eq!(own.title, "Shipped a new release of tool today! #rust");
    assert_eq!(own.author.as_deref(), Some("ada"));
    assert_eq!(own.media, vec!["https://files.social.test/a.png".to_string()]);
    assert_eq!(own.tags, vec!["rust".to_string()]);
    assert!(own.trending);

    let boosted = &items[1];
    assert_eq!(boosted.external_id, "109999");
    assert_eq!(boosted.canonical_url, "https://other.test/@cy/109999");
    assert_eq!(boosted.title, "hot take");
    assert_eq!(
        boosted.metrics,
        KindMetrics::Post {
            followers: 800,
            likes: 9,
            reposts: 2
        }
    );
}

#[test]
fn garbage_documents_fail_whole_fetch() {
    assert!(SyndicationAdapter::parse_feed("<rss><channel><item>").is_err());
    assert!(ModelHubAdapter::parse_listing("{\"oops\": 1}", "https://hub.test").is_err());
    assert!(RepositoryHubAdapter::parse_listing("not json").is_err());
    assert!(MicroblogAdapter::parse_timeline("{}", false).is_err());
}
