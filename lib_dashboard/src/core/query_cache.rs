//! # Query Cache Manager
//!
//! Keyed store of fetch results. Each key owns exactly one [`CacheEntry`] for the
//! lifetime of the process; entries are refreshed in place and never evicted.
//!
//! ## Fetch Rules (`ensure_fresh`):
//! 1.  A missing key is created in `Idle`.
//! 2.  A key that is already `Loading` hands out the same shared in-flight future,
//!     so N concurrent callers trigger one operation and observe one result.
//! 3.  `Idle` keys and keys past their `stale_at` deadline are fetched.
//! 4.  Success stores the data and opens a new staleness window.
//! 5.  Failure retries once (unless the error is a caller-local 4xx or the
//!     descriptor allows no retries). A final failure records the error but keeps
//!     the last good data visible (stale-while-error).
//! 6.  Fresh `Success` entries are served without touching the network.
//!
//! The operation runs on its own spawned task. A caller that stops waiting (for
//! example a cancelled poll tick) never cancels the fetch; its result still lands
//! in the cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::retrieve::api_error::ApiError;

/// Staleness window applied when a descriptor does not set one.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(30_000);
/// Retry budget applied when a descriptor does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// The fetch behind a cache key.
pub type Operation<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

type SharedFetch<T> = Shared<BoxFuture<'static, CacheEntry<T>>>;

/// # Request Descriptor
///
/// Describes a logical resource: its cache identity, how to fetch it, and the
/// freshness policy. Two descriptors with the same `key` are the same resource.
pub struct RequestDescriptor<T> {
    pub key: String,
    pub operation: Operation<T>,
    pub stale_after: Duration,
    pub max_retries: u32,
    /// Preferred refresh period when the resource is shown as a live feed.
    pub poll_interval: Option<Duration>,
}

impl<T> Clone for RequestDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            operation: Arc::clone(&self.operation),
            stale_after: self.stale_after,
            max_retries: self.max_retries,
            poll_interval: self.poll_interval,
        }
    }
}

impl<T> std::fmt::Debug for RequestDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("key", &self.key)
            .field("stale_after", &self.stale_after)
            .field("max_retries", &self.max_retries)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<T: 'static> RequestDescriptor<T> {
    /// Creates a descriptor with the default policy (30 s staleness, one retry, no polling).
    pub fn new<F, Fut>(key: impl Into<String>, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            operation: Arc::new(move || operation().boxed()),
            stale_after: DEFAULT_STALE_AFTER,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: None,
        }
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// # Cache Entry
///
/// Snapshot of one key. `data` survives a failed refresh, so `status == Error`
/// with `data.is_some()` means "showing the last good value".
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub status: CacheStatus,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub fetched_at: Option<Instant>,
    pub stale_at: Option<Instant>,
    pub in_flight: bool,
}

impl<T> CacheEntry<T> {
    fn idle(key: &str) -> Self {
        Self {
            key: key.to_string(),
            status: CacheStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            stale_at: None,
            in_flight: false,
        }
    }

    /// True when `ensure_fresh` at `now` would issue a fetch.
    pub fn needs_fetch(&self, now: Instant) -> bool {
        match self.status {
            CacheStatus::Idle => true,
            CacheStatus::Loading => false,
            CacheStatus::Success | CacheStatus::Error => self.stale_at.map_or(true, |at| now >= at),
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        self.stale_at.map_or(true, |at| now >= at)
    }
}

impl CacheEntry<Value> {
    /// Deserializes the cached JSON into a typed model. `Ok(None)` when no data has landed yet.
    pub fn decode<M: DeserializeOwned>(&self) -> Result<Option<M>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }
}

struct Slot<T> {
    entry: CacheEntry<T>,
    pending: Option<SharedFetch<T>>,
    tx: watch::Sender<CacheEntry<T>>,
}

impl<T: Clone> Slot<T> {
    fn new(key: &str) -> Self {
        let entry = CacheEntry::idle(key);
        let (tx, _) = watch::channel(entry.clone());
        Self {
            entry,
            pending: None,
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.entry.clone());
    }
}

/// # Query Cache
///
/// Cloning yields another handle to the same store.
pub struct QueryCache<T = Value> {
    slots: Arc<Mutex<HashMap<String, Slot<T>>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot_mut<'a>(map: &'a mut HashMap<String, Slot<T>>, key: &str) -> &'a mut Slot<T> {
        map.entry(key.to_string()).or_insert_with(|| Slot::new(key))
    }

    /// Synchronous read of the current state, creating an `Idle` entry on first use.
    pub fn fetch(&self, descriptor: &RequestDescriptor<T>) -> CacheEntry<T> {
        let mut map = self.lock();
        Self::slot_mut(&mut map, &descriptor.key).entry.clone()
    }

    /// Current state of `key`, if it has ever been requested.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.lock().get(key).map(|slot| slot.entry.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Observes every transition of `key`. The receiver starts at the current state.
    pub fn watch(&self, key: &str) -> watch::Receiver<CacheEntry<T>> {
        let mut map = self.lock();
        Self::slot_mut(&mut map, key).tx.subscribe()
    }

    /// Marks a populated entry stale so the next `ensure_fresh` refetches it.
    pub fn invalidate(&self, key: &str) {
        let mut map = self.lock();
        if let Some(slot) = map.get_mut(key) {
            if slot.entry.stale_at.is_some() {
                slot.entry.stale_at = Some(Instant::now());
                slot.publish();
                log::debug!("Cache entry {} invalidated", key);
            }
        }
    }

    /// Brings `descriptor.key` up to date and resolves once the entry is settled.
    pub async fn ensure_fresh(&self, descriptor: &RequestDescriptor<T>) -> CacheEntry<T> {
        self.load(descriptor, false).await
    }

    /// Fetches `descriptor.key` even when the entry is still fresh.
    ///
    /// A fetch already in flight is joined instead of duplicated; retry and
    /// stale-while-error apply as for [`QueryCache::ensure_fresh`].
    pub async fn refetch(&self, descriptor: &RequestDescriptor<T>) -> CacheEntry<T> {
        self.load(descriptor, true).await
    }

    async fn load(&self, descriptor: &RequestDescriptor<T>, force: bool) -> CacheEntry<T> {
        let pending = {
            let mut map = self.lock();
            let slot = Self::slot_mut(&mut map, &descriptor.key);

            if let Some(pending) = &slot.pending {
                log::debug!("Joining in-flight fetch for {}", descriptor.key);
                pending.clone()
            } else if !force && !slot.entry.needs_fetch(Instant::now()) {
                return slot.entry.clone();
            } else {
                slot.entry.status = CacheStatus::Loading;
                slot.entry.in_flight = true;
                slot.publish();

                let pending = self.spawn_fetch(descriptor.clone());
                slot.pending = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    fn spawn_fetch(&self, descriptor: RequestDescriptor<T>) -> SharedFetch<T> {
        let key = descriptor.key.clone();
        let stale_after = descriptor.stale_after;
        log::debug!("Fetching {}", key);

        let cache = self.clone();
        let task = tokio::spawn(async move {
            let outcome = run_with_retry(&descriptor).await;
            cache.settle(&descriptor.key, descriptor.stale_after, outcome)
        });

        let cache = self.clone();
        async move {
            match task.await {
                Ok(entry) => entry,
                Err(join_err) => {
                    let err = ApiError::network(
                        "fetch task aborted",
                        json!({ "key": key, "reason": join_err.to_string() }),
                    );
                    cache.settle(&key, stale_after, Err(err))
                }
            }
        }
        .boxed()
        .shared()
    }

    fn settle(
        &self,
        key: &str,
        stale_after: Duration,
        outcome: Result<T, ApiError>,
    ) -> CacheEntry<T> {
        let mut map = self.lock();
        let slot = Self::slot_mut(&mut map, key);
        let now = Instant::now();

        match outcome {
            Ok(data) => {
                slot.entry.data = Some(data);
                slot.entry.error = None;
                slot.entry.fetched_at = Some(now);
                slot.entry.stale_at = Some(now + stale_after);
                slot.entry.status = CacheStatus::Success;
            }
            Err(err) => {
                log::warn!("Fetch for {} failed: {}", key, err);
                slot.entry.error = Some(err);
                slot.entry.status = CacheStatus::Error;
            }
        }
        slot.entry.in_flight = false;
        slot.pending = None;
        slot.publish();
        slot.entry.clone()
    }
}

async fn run_with_retry<T: 'static>(descriptor: &RequestDescriptor<T>) -> Result<T, ApiError> {
    match (descriptor.operation)().await {
        Ok(data) => Ok(data),
        Err(err) if descriptor.max_retries > 0 && !err.is_caller_local() => {
            log::info!("Fetch for {} failed ({}), retrying once", descriptor.key, err);
            (descriptor.operation)().await
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Descriptor whose operation counts calls and answers with the call number.
    fn counting(
        key: &str,
        calls: &Arc<AtomicUsize>,
        latency: Duration,
    ) -> RequestDescriptor<Value> {
        let calls = Arc::clone(calls);
        RequestDescriptor::new(key, move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                sleep(latency).await;
                Ok(json!(n))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("GET /api/threats/live", &calls, Duration::from_millis(100));

        let results = join_all((0..5).map(|_| cache.ensure_fresh(&desc))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for entry in results {
            assert_eq!(entry.status, CacheStatus::Success);
            assert_eq!(entry.data, Some(json!(1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served_until_stale() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("k", &calls, Duration::ZERO).stale_after(Duration::from_millis(1000));

        cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(999)).await;
        let hit = cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hit.data, Some(json!(1)));

        sleep(Duration::from_millis(2)).await;
        let refreshed = cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.data, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_last_good_data() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(AtomicBool::new(false));

        let (c, f) = (Arc::clone(&calls), Arc::clone(&failing));
        let desc = RequestDescriptor::new("summary", move || {
            let (c, f) = (Arc::clone(&c), Arc::clone(&f));
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if f.load(Ordering::SeqCst) {
                    Err(ApiError::from_response(502, Value::Null))
                } else {
                    Ok(json!({"total": 10}))
                }
            }
        })
        .stale_after(Duration::ZERO);

        let first = cache.ensure_fresh(&desc).await;
        assert_eq!(first.status, CacheStatus::Success);

        failing.store(true, Ordering::SeqCst);
        let second = cache.ensure_fresh(&desc).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3, "one call, then one call plus one retry");
        assert_eq!(second.status, CacheStatus::Error);
        assert_eq!(second.data, Some(json!({"total": 10})));
        assert_eq!(second.error.and_then(|e| e.status_code()), Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_on_retry() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let desc = RequestDescriptor::new("k", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::network("reset by peer", Value::Null))
                } else {
                    Ok(json!("ok"))
                }
            }
        });

        let entry = cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.status, CacheStatus::Success);
        assert!(entry.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_and_zero_budget_are_not_retried() {
        let cache: QueryCache<Value> = QueryCache::new();

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let not_found = RequestDescriptor::new("missing", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_response(404, Value::Null))
            }
        });
        let entry = cache.ensure_fresh(&not_found).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.status, CacheStatus::Error);

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let no_retry = RequestDescriptor::new("down", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_response(503, Value::Null))
            }
        })
        .max_retries(0);
        cache.ensure_fresh(&no_retry).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_reads_without_network() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("idle", &calls, Duration::ZERO);

        let entry = cache.fetch(&desc);
        assert_eq!(entry.status, CacheStatus::Idle);
        assert!(entry.data.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.get("idle").is_some());
        assert_eq!(cache.keys(), vec!["idle".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("k", &calls, Duration::ZERO);

        cache.ensure_fresh(&desc).await;
        cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("k");
        cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_ignores_freshness_but_joins_in_flight() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("GET /health/ready", &calls, Duration::from_millis(100));

        cache.ensure_fresh(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Still inside the default 30 s window.
        let entry = cache.refetch(&desc).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.data, Some(json!(2)));

        let (a, b, c) = tokio::join!(
            cache.refetch(&desc),
            cache.refetch(&desc),
            cache.ensure_fresh(&desc)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(a.data, Some(json!(3)));
        assert_eq!(b.data, a.data);
        assert_eq!(c.data, a.data);
    }

    #[tokio::test(start_paused = true)]
    async fn watchers_observe_loading_then_success() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = counting("watched", &calls, Duration::from_millis(50));
        let mut rx = cache.watch("watched");
        assert_eq!(rx.borrow().status, CacheStatus::Idle);

        let background = cache.clone();
        let d = desc.clone();
        tokio::spawn(async move { background.ensure_fresh(&d).await });

        rx.changed().await.expect("loading published");
        assert_eq!(rx.borrow_and_update().status, CacheStatus::Loading);
        rx.changed().await.expect("success published");
        assert_eq!(rx.borrow().status, CacheStatus::Success);
    }

    #[test]
    fn decode_maps_cached_json() {
        #[derive(serde::Deserialize)]
        struct Region {
            region: String,
            count: u64,
        }

        let mut entry = CacheEntry::<Value>::idle("GET /api/threats/regions");
        assert!(entry.decode::<Vec<Region>>().unwrap().is_none());

        entry.data = Some(json!([{"region": "Eastern Europe", "count": 4281}]));
        let regions = entry.decode::<Vec<Region>>().unwrap().unwrap();
        assert_eq!(regions[0].region, "Eastern Europe");
        assert_eq!(regions[0].count, 4281);
    }
}
