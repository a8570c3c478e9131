// tests/sync_scheduler.rs
//
// Background pass loop under paused tokio time. Wall-clock eligibility does
// not move while tokio time is paused, so a synced source stays ineligible
// across ticks.

mod common;

use std::time::Duration;

use common::{add_source, entry, orchestrator, rss, ScriptedFetcher};
use feedrank::model::SourceKind;
use feedrank::store::SourceStore;
use feedrank::sync::scheduler::Scheduler;
use feedrank::{LocalStore, SyncSettings};

#[tokio::test(start_paused = true)]
async fn first_tick_is_immediate_and_new_sources_join_next_tick() {
    let store = std::sync::Arc::new(LocalStore::in_memory());
    let fetcher = ScriptedFetcher::new();
    let orch = orchestrator(
        store.clone(),
        fetcher.clone(),
        SyncSettings {
            interval: Duration::from_secs(60),
            workers: 2,
            ..SyncSettings::default()
        },
    );

    let a = add_source(store.as_ref(), SourceKind::Syndication, "https://feeds.test/a.xml").await;
    fetcher.respond("https://feeds.test/a.xml", rss(&[entry("a1", "A", "https://a.test/1", 0)]));
    let scheduler = Scheduler::spawn(orch.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.runs_for(a.id, 10).len(), 1);

    let b = add_source(store.as_ref(), SourceKind::Syndication, "https://feeds.test/b.xml").await;
    fetcher.respond("https://feeds.test/b.xml", rss(&[entry("b1", "B", "https://b.test/1", 0)]));

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.runs_for(b.id, 10).len(), 1);
    assert_eq!(store.runs_for(a.id, 10).len(), 1, "a is not due yet");

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(fetcher.calls().len(), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_loop() {
    let store = std::sync::Arc::new(LocalStore::in_memory());
    let fetcher = ScriptedFetcher::new();
    let orch = orchestrator(store.clone(), fetcher.clone(), common::settings());
    let scheduler = Scheduler::spawn(orch);
    tokio::time::sleep(Duration::from_millis(5)).await;
    scheduler.shutdown().await;

    // Anything added afterwards is never picked up.
    let a = add_source(store.as_ref(), SourceKind::Syndication, "https://feeds.test/a.xml").await;
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert!(store.runs_for(a.id, 10).is_empty());
    assert!(fetcher.calls().is_empty());
}
