//! # Scheduling Capability
//!
//! Timers used by the live feed and the notification queue are never raw
//! `tokio::spawn` + `sleep` calls scattered through the code. They go through a
//! [`Scheduler`], which hands back an explicit [`TaskHandle`] that the owner
//! cancels when the timer is no longer wanted.
//!
//! [`TokioScheduler`] is backed by `tokio::time`, so tests drive it with a
//! paused clock.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A job run on every tick of a periodic task.
pub type TickJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle to a scheduled task.
///
/// Dropping the handle detaches the task; only [`TaskHandle::cancel`] stops it.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Stops the task. Once this returns the task will not run another tick or
    /// fire its one-shot job.
    pub fn cancel(&self) {
        self.token.cancel();
        self.join.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Source of cancellable timers.
pub trait Scheduler: Send + Sync {
    /// Runs `job` once after `delay`.
    fn once(&self, delay: Duration, job: BoxFuture<'static, ()>) -> TaskHandle;

    /// Runs `job` immediately, then every `period` until cancelled.
    ///
    /// A tick that overruns the period delays the following ones rather than
    /// bursting to catch up.
    fn every(&self, period: Duration, job: TickJob) -> TaskHandle;
}

/// [`Scheduler`] backed by the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn once(&self, delay: Duration, job: BoxFuture<'static, ()>) -> TaskHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = sleep(delay) => {
                    if !child.is_cancelled() {
                        job.await;
                    }
                }
            }
        });
        TaskHandle { token, join }
    }

    fn every(&self, period: Duration, job: TickJob) -> TaskHandle {
        // `interval` rejects a zero period.
        let period = period.max(MIN_PERIOD);
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }
        });
        TaskHandle { token, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> TickJob {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let handle = TokioScheduler.once(
            Duration::from_millis(500),
            async move {
                f.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );

        sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
        sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_once_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let handle = TokioScheduler.once(
            Duration::from_millis(100),
            async move {
                f.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        handle.cancel();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn every_runs_immediately_then_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = TokioScheduler.every(Duration::from_millis(1000), counting_job(&ticks));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        handle.cancel();
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
