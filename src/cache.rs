use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use log::debug;
use moka::future::Cache;
use moka::Expiry;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;

/// cached response containing status code, headers, and body
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    /// rough in-memory footprint, used to bound the cache by size
    fn weight(&self) -> u32 {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        u32::try_from(self.body.len() + headers).unwrap_or(u32::MAX)
    }
}

/// key-value store the proxy caches responses in.
///
/// entries are written whole; a lookup either sees a complete response or
/// nothing. absence is never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<Arc<CachedResponse>>;

    async fn store(&self, key: String, response: Arc<CachedResponse>, ttl: Duration);

    fn entry_count(&self) -> u64;
}

#[derive(Clone)]
struct Entry {
    response: Arc<CachedResponse>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// in-process store backed by moka, bounded by total body size
pub struct MokaStore {
    cache: Cache<String, Entry>,
}

impl MokaStore {
    pub fn new(size_mb: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(size_mb.saturating_mul(1024 * 1024))
            .weigher(|key: &String, entry: &Entry| {
                entry
                    .response
                    .weight()
                    .saturating_add(u32::try_from(key.len()).unwrap_or(u32::MAX))
            })
            .expire_after(EntryTtl)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaStore {
    async fn lookup(&self, key: &str) -> Option<Arc<CachedResponse>> {
        self.cache.get(key).await.map(|entry| entry.response)
    }

    async fn store(&self, key: String, response: Arc<CachedResponse>, ttl: Duration) {
        self.cache.insert(key, Entry { response, ttl }).await;
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub hit_ratio: f32,
}

/// the handlers' view of the cache.
///
/// lookups never reach the origin. writes run as tracked background tasks
/// so the response path never waits on them, and shutdown can drain them.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    tasks: TaskTracker,
    counters: Arc<Counters>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            tasks: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<Arc<CachedResponse>> {
        let found = self.store.lookup(key).await;
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// writes the entry, waiting for the store to accept it
    pub async fn put(&self, key: String, response: Arc<CachedResponse>, ttl: Duration) {
        debug!("caching {} ({} bytes, ttl {}s)", key, response.body.len(), ttl.as_secs());
        self.store.store(key, response, ttl).await;
    }

    /// schedules the write and returns immediately
    pub fn store(&self, key: String, response: Arc<CachedResponse>, ttl: Duration) {
        let cache = self.clone();
        self.tasks.spawn(async move { cache.put(key, response, ttl).await });
    }

    /// runs background work whose lifetime shutdown should account for
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// waits for tracked background work. returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok();
        self.tasks.reopen();
        drained
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            entries: self.store.entry_count(),
            hit_ratio: if hits + misses > 0 {
                hits as f32 / (hits + misses) as f32
            } else {
                0.0
            },
        }
    }
}
