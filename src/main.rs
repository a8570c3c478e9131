//! feedrank binary entrypoint.
//! Loads config, opens the store, runs the sync scheduler and serves the ops
//! router until Ctrl-C, then stops the scheduler and compacts the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedrank::api::{self, AppState};
use feedrank::ingest::fetch::HttpFetcher;
use feedrank::ingest::throttle::{RateLimiter, ResponseCache, ThrottledFetcher};
use feedrank::ingest::AdapterRegistry;
use feedrank::metrics::Metrics;
use feedrank::sync::scheduler::Scheduler;
use feedrank::{Admin, EngineConfig, LocalStore, Orchestrator, SyncSettings};

/// Compact logs by default, JSON lines when LOG_FORMAT=json.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedrank=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn build_fetcher(cfg: &EngineConfig) -> anyhow::Result<ThrottledFetcher<HttpFetcher>> {
    let http = HttpFetcher::new().context("building http client")?;
    let limiter = cfg.host_rate_limits_ms.iter().fold(
        RateLimiter::new(Duration::from_millis(cfg.rate_limit_ms)),
        |rl, (host, ms)| rl.with_host_interval(host.clone(), Duration::from_millis(*ms)),
    );
    let cache = ResponseCache::new(Duration::from_secs(cfg.cache_ttl_secs), cfg.cache_capacity);
    Ok(ThrottledFetcher::new(http, limiter, cache))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = EngineConfig::load_default().context("loading engine config")?;
    tracing::info!(
        interval_secs = cfg.sync_interval_secs,
        workers = cfg.workers,
        store = %cfg.store_path.display(),
        credentials = ?cfg.credentials,
        "config loaded"
    );

    let metrics = Metrics::init(cfg.sync_interval_secs).context("installing metrics recorder")?;

    let store = Arc::new(LocalStore::open(&cfg.store_path)?);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(build_fetcher(&cfg)?),
        AdapterRegistry::with_defaults(&cfg.credentials),
        SyncSettings::from(&cfg),
    ));
    let scheduler = Scheduler::spawn(orchestrator.clone());

    let state = AppState {
        admin: Arc::new(Admin::new(orchestrator)),
        config: cfg.summary(),
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "ops server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
        })
        .await
        .context("ops server")?;

    scheduler.shutdown().await;
    store.shutdown().context("compacting store")?;
    tracing::info!("bye");
    Ok(())
}
