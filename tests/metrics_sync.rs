// tests/metrics_sync.rs
#![cfg(feature = "strict-metrics")]

mod common;

use common::{add_source, entry, memory_harness, rss};
use feedrank::metrics::Metrics;
use feedrank::model::SourceKind;
use feedrank::store::ContentStore;

#[tokio::test]
async fn metrics_exposed_after_sync_pass() {
    // Install the process-wide recorder before anything describes series.
    let metrics = Metrics::init(60).expect("recorder");

    let (store, fetcher, orch) = memory_harness();
    let ok = add_source(store.as_ref(), SourceKind::Syndication, "https://feeds.test/a.xml").await;
    add_source(store.as_ref(), SourceKind::Syndication, "https://feeds.test/missing.xml").await;
    fetcher.respond(
        "https://feeds.test/a.xml",
        rss(&[entry("g1", "One", "https://a.test/1", 2)]),
    );

    let report = orch.run_pass(chrono::Utc::now()).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.items_for_source(ok.id).len(), 1);

    let out = metrics.handle.render();
    for needle in [
        "sync_interval_secs 60",
        "sync_runs_total{status=\"succeeded\"} 1",
        "sync_runs_total{status=\"failed\"} 1",
        "sync_items_saved_total 1",
        "ingest_items_total",
        "ingest_fetch_errors_total",
        "ingest_parse_ms",
        "sync_last_pass_ts",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }
}
