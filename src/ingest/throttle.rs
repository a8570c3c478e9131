//! Process-wide upstream throttle and response cache.
//!
//! [`ThrottledFetcher`] wraps any [`Fetcher`]: a cache hit returns without
//! touching the network or the limiter; a miss waits for the host's next
//! slot, fetches, and caches successful bodies for `ttl`. The request's
//! timeout budget starts once the slot is granted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::ingest::fetch::{FetchRequest, Fetcher};

/// Minimum spacing between calls to the same host.
#[derive(Debug)]
pub struct RateLimiter {
    default_interval: Duration,
    per_host: HashMap<String, Duration>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            per_host: HashMap::new(),
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_host_interval(mut self, host: impl Into<String>, interval: Duration) -> Self {
        self.per_host.insert(host.into().to_ascii_lowercase(), interval);
        self
    }

    fn interval_for(&self, host: &str) -> Duration {
        self.per_host
            .get(host)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Reserve the next slot for `host` and return how long to wait for it.
    /// Reservation happens under the lock so concurrent callers queue up.
    pub fn reserve(&self, host: &str) -> Duration {
        let interval = self.interval_for(host);
        let now = Instant::now();
        let mut slots = self.next_slot.lock();
        let slot = match slots.get(host) {
            Some(&t) if t > now => t,
            _ => now,
        };
        slots.insert(host.to_string(), slot + interval);
        slot.saturating_duration_since(now)
    }

    pub async fn acquire(&self, host: &str) {
        let wait = self.reserve(host);
        if !wait.is_zero() {
            counter!("ingest_throttled_total").increment(1);
            tokio::time::sleep(wait).await;
        }
    }
}

/// TTL cache of response bodies keyed by request URL.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, (Instant, Arc<str>)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored_at, body)) if stored_at.elapsed() < self.ttl => Some(body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, body: Arc<str>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, (t, _)| t.elapsed() < ttl);
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, (t, _))| *t)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), (Instant::now(), body));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
}

pub struct ThrottledFetcher<F: Fetcher> {
    inner: F,
    limiter: RateLimiter,
    cache: ResponseCache,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, limiter: RateLimiter, cache: ResponseCache) -> Self {
        Self {
            inner,
            limiter,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn get(&self, req: &FetchRequest) -> Result<String, FetchError> {
        if let Some(hit) = self.cache.get(&req.url) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("ingest_cache_hits_total").increment(1);
            return Ok(hit.to_string());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        self.limiter.acquire(&host_of(&req.url)).await;
        let body = match tokio::time::timeout(req.timeout, self.inner.get(req)).await {
            Ok(out) => out?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: req.url.clone(),
                    budget: req.timeout,
                })
            }
        };
        self.cache.put(&req.url, Arc::from(body.as_str()));
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reservations_are_spaced_per_host() {
        let rl = RateLimiter::new(Duration::from_millis(500))
            .with_host_interval("slow.test", Duration::from_secs(2));
        assert_eq!(rl.reserve("a.test"), Duration::ZERO);
        assert_eq!(rl.reserve("a.test"), Duration::from_millis(500));
        assert_eq!(rl.reserve("a.test"), Duration::from_millis(1000));
        // Other hosts are independent.
        assert_eq!(rl.reserve("b.test"), Duration::ZERO);
        assert_eq!(rl.reserve("slow.test"), Duration::ZERO);
        assert_eq!(rl.reserve("slow.test"), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let cache = ResponseCache::new(Duration::from_secs(10), 8);
        cache.put("k", Arc::from("v"));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    /// Records when each call reached the network.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait::async_trait]
    impl Fetcher for Recording {
        async fn get(&self, req: &FetchRequest) -> Result<String, FetchError> {
            self.calls.lock().push((req.url.clone(), Instant::now()));
            Ok(format!("body of {}", req.url))
        }
    }

    fn req(url: &str) -> FetchRequest {
        FetchRequest::get(url, "*/*", Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_url_is_served_from_cache() {
        let fetcher = ThrottledFetcher::new(
            Recording::default(),
            RateLimiter::new(Duration::from_secs(1)),
            ResponseCache::new(Duration::from_secs(60), 16),
        );
        let a = fetcher.get(&req("https://hub.test/models")).await.unwrap();
        let b = fetcher.get(&req("https://hub.test/models")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(fetcher.inner.calls.lock().len(), 1);
        assert_eq!(
            fetcher.stats(),
            ThrottleStats {
                cache_hits: 1,
                cache_misses: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_on_one_host_are_spaced() {
        let fetcher = ThrottledFetcher::new(
            Recording::default(),
            RateLimiter::new(Duration::from_millis(500)),
            ResponseCache::new(Duration::ZERO, 1),
        );
        let urls = [
            "https://hub.test/a",
            "https://hub.test/b",
            "https://hub.test/c",
            "https://other.test/a",
        ];
        let reqs: Vec<FetchRequest> = urls.iter().map(|u| req(u)).collect();
        let results = futures::future::join_all(reqs.iter().map(|r| fetcher.get(r))).await;
        assert!(results.iter().all(Result::is_ok));

        let calls = fetcher.inner.calls.lock().clone();
        let mut hub: Vec<Instant> = calls
            .iter()
            .filter(|(u, _)| u.contains("hub.test"))
            .map(|(_, t)| *t)
            .collect();
        hub.sort();
        assert_eq!(hub.len(), 3);
        for pair in hub.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        // A different host does not queue behind hub.test.
        let other = calls.iter().find(|(u, _)| u.contains("other.test")).unwrap().1;
        assert_eq!(other, hub[0]);
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl Fetcher for Stalled {
        async fn get(&self, _req: &FetchRequest) -> Result<String, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_starts_after_the_slot_is_granted() {
        let fetcher = ThrottledFetcher::new(
            Recording::default(),
            RateLimiter::new(Duration::from_secs(20)),
            ResponseCache::new(Duration::ZERO, 1),
        );
        let reqs: Vec<FetchRequest> = ["https://hub.test/1", "https://hub.test/2", "https://hub.test/3"]
            .iter()
            .map(|u| req(u))
            .collect();
        // The third caller queues 40s behind a 5s budget and still succeeds.
        let results = futures::future::join_all(reqs.iter().map(|r| fetcher.get(r))).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fetcher.inner.calls.lock().len(), 3);

        let stalled = ThrottledFetcher::new(
            Stalled,
            RateLimiter::new(Duration::ZERO),
            ResponseCache::new(Duration::ZERO, 1),
        );
        let err = stalled.get(&req("https://hub.test/slow")).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { budget, .. } if budget == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_evicts_oldest_at_capacity() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.put("a", Arc::from("1"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put("b", Arc::from("2"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put("c", Arc::from("3"));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 2);
    }
}
