//! # Live Feed Registry
//!
//! Owns the set of polling subscriptions that keep dashboard panels fresh, and
//! the single live/pause switch that gates all of them.
//!
//! - Each subscription has its own interval and its own timer; none are shared.
//! - Every tick refetches, whatever the entry's staleness window says. Ticks
//!   still join a fetch already in flight for the same key.
//! - Pausing cancels every timer before `set_live(false)` returns but keeps the
//!   subscriptions registered. Resuming re-arms each one from zero, starting with
//!   an immediate refresh.
//! - Stopping a subscription cancels its timer only. A fetch already in flight
//!   for that key is owned by the cache and still lands there.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;

use crate::core::query_cache::{QueryCache, RequestDescriptor};
use crate::core::scheduler::{Scheduler, TaskHandle, TickJob};

/// Identifies one polling subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollHandle(u64);

/// A registered live feed.
struct PollSubscription<T> {
    descriptor: RequestDescriptor<T>,
    interval: Duration,
    enabled: bool,
    timer: Option<TaskHandle>,
}

impl<T> PollSubscription<T> {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct RegistryState<T> {
    live: bool,
    next_id: u64,
    subscriptions: HashMap<PollHandle, PollSubscription<T>>,
}

/// # Live Feed Coordinator
pub struct LiveFeed<T> {
    cache: QueryCache<T>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<RegistryState<T>>,
}

impl<T> LiveFeed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a coordinator in the live state.
    pub fn new(cache: QueryCache<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            cache,
            scheduler,
            state: Mutex::new(RegistryState {
                live: true,
                next_id: 0,
                subscriptions: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tick_job(&self, descriptor: &RequestDescriptor<T>) -> TickJob {
        let cache = self.cache.clone();
        let descriptor = descriptor.clone();
        Arc::new(move || {
            let cache = cache.clone();
            let descriptor = descriptor.clone();
            async move {
                cache.refetch(&descriptor).await;
            }
            .boxed()
        })
    }

    fn arm(&self, subscription: &mut PollSubscription<T>) {
        subscription.disarm();
        let job = self.tick_job(&subscription.descriptor);
        subscription.timer = Some(self.scheduler.every(subscription.interval, job));
        log::debug!(
            "Live feed armed for {} every {:?}",
            subscription.descriptor.key,
            subscription.interval
        );
    }

    /// Registers a feed for `descriptor`, refreshing it now and every `interval`
    /// while the coordinator is live.
    pub fn start_polling(
        &self,
        descriptor: RequestDescriptor<T>,
        interval: Duration,
    ) -> PollHandle {
        let mut state = self.lock();
        let handle = PollHandle(state.next_id);
        state.next_id += 1;

        let mut subscription = PollSubscription {
            descriptor,
            interval,
            enabled: state.live,
            timer: None,
        };

        if state.live {
            // The first tick of the periodic task is the immediate refresh.
            self.arm(&mut subscription);
        } else {
            // One refresh now; ticking waits for resume. Held as the timer so a
            // stop before it runs cancels it.
            let cache = self.cache.clone();
            let descriptor = subscription.descriptor.clone();
            subscription.timer = Some(self.scheduler.once(
                Duration::ZERO,
                async move {
                    cache.refetch(&descriptor).await;
                }
                .boxed(),
            ));
        }

        state.subscriptions.insert(handle, subscription);
        handle
    }

    /// Cancels and removes one feed. Unknown or already-stopped handles are ignored.
    pub fn stop_polling(&self, handle: PollHandle) {
        let mut state = self.lock();
        if let Some(mut subscription) = state.subscriptions.remove(&handle) {
            subscription.disarm();
            log::debug!("Live feed stopped for {}", subscription.descriptor.key);
        }
    }

    /// Cancels and removes every feed, e.g. when the consuming view is torn down.
    pub fn stop_all(&self) {
        let mut state = self.lock();
        for (_, mut subscription) in state.subscriptions.drain() {
            subscription.disarm();
        }
    }

    /// Flips the global live switch.
    pub fn set_live(&self, live: bool) {
        let mut state = self.lock();
        if state.live == live {
            return;
        }
        state.live = live;
        log::info!("Live feeds {}", if live { "resumed" } else { "paused" });

        for subscription in state.subscriptions.values_mut() {
            subscription.enabled = live;
            if live {
                self.arm(subscription);
            } else {
                subscription.disarm();
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.lock().live
    }

    pub fn active_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Whether `handle` is registered and currently ticking.
    pub fn is_enabled(&self, handle: PollHandle) -> bool {
        self.lock()
            .subscriptions
            .get(&handle)
            .map_or(false, |s| s.enabled && s.timer.is_some())
    }
}

impl<T> Drop for LiveFeed<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for subscription in state.subscriptions.values_mut() {
            subscription.disarm();
        }
    }
}
