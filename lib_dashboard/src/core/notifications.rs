//! # Notification Scheduler
//!
//! The toast queue. Producers enqueue messages; the renderer reads (or watches)
//! the visible sequence, which is always in insertion order.
//!
//! A notification leaves the queue through whichever happens first: its own
//! expiry timer, or an explicit `dismiss`. Both paths tolerate the other having
//! already run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::core::dispatcher::{Disposer, ErrorBus};
use crate::core::scheduler::{Scheduler, TaskHandle};

/// Lifetime used by the `success`/`info`/`warning`/`error` helpers.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// `None` means the notification stays until dismissed.
    pub expires_at: Option<DateTime<Utc>>,
}

struct Queue {
    next_id: u64,
    visible: Vec<Notification>,
    timers: HashMap<u64, TaskHandle>,
    tx: watch::Sender<Vec<Notification>>,
}

impl Queue {
    fn remove(&mut self, id: u64) -> bool {
        if let Some(timer) = self.timers.remove(&id) {
            timer.cancel();
        }
        let before = self.visible.len();
        self.visible.retain(|n| n.id != id);
        let removed = self.visible.len() != before;
        if removed {
            self.tx.send_replace(self.visible.clone());
        }
        removed
    }
}

/// # Notifications
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Notifications {
    queue: Arc<Mutex<Queue>>,
    scheduler: Arc<dyn Scheduler>,
}

fn lock_queue(queue: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(|e| e.into_inner())
}

impl Notifications {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self {
            queue: Arc::new(Mutex::new(Queue {
                next_id: 1,
                visible: Vec::new(),
                timers: HashMap::new(),
                tx,
            })),
            scheduler,
        }
    }

    /// Appends a notification and returns its id.
    ///
    /// A positive `duration` arms a one-shot timer that dismisses it; `None` or
    /// zero keeps it until [`Notifications::dismiss`] is called.
    pub fn enqueue(
        &self,
        message: impl Into<String>,
        severity: Severity,
        duration: Option<Duration>,
    ) -> u64 {
        let duration = duration.filter(|d| !d.is_zero());
        let created_at = Utc::now();
        let expires_at = duration
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| created_at + d);

        let mut queue = lock_queue(&self.queue);
        let id = queue.next_id;
        queue.next_id += 1;

        queue.visible.push(Notification {
            id,
            message: message.into(),
            severity,
            created_at,
            expires_at,
        });

        if let Some(duration) = duration {
            let weak: Weak<Mutex<Queue>> = Arc::downgrade(&self.queue);
            let timer = self.scheduler.once(
                duration,
                async move {
                    if let Some(queue) = weak.upgrade() {
                        let mut queue = lock_queue(&queue);
                        // Our own handle; dropping it here must not abort this task.
                        queue.timers.remove(&id);
                        queue.remove(id);
                        log::debug!("Notification {} expired", id);
                    }
                }
                .boxed(),
            );
            queue.timers.insert(id, timer);
        }

        queue.tx.send_replace(queue.visible.clone());
        log::debug!("Notification {} enqueued ({:?})", id, severity);
        id
    }

    /// Removes `id` if it is still visible. Unknown ids are ignored.
    pub fn dismiss(&self, id: u64) {
        if lock_queue(&self.queue).remove(id) {
            log::debug!("Notification {} dismissed", id);
        }
    }

    pub fn dismiss_all(&self) {
        let mut queue = lock_queue(&self.queue);
        for (_, timer) in queue.timers.drain() {
            timer.cancel();
        }
        queue.visible.clear();
        queue.tx.send_replace(Vec::new());
    }

    /// Snapshot of the visible notifications in display order.
    pub fn visible(&self) -> Vec<Notification> {
        lock_queue(&self.queue).visible.clone()
    }

    /// Live view of the visible sequence; updated on every enqueue and removal.
    pub fn watch(&self) -> watch::Receiver<Vec<Notification>> {
        lock_queue(&self.queue).tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.enqueue(message, Severity::Success, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.enqueue(message, Severity::Info, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.enqueue(message, Severity::Warning, Some(DEFAULT_TOAST_DURATION))
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.enqueue(message, Severity::Error, Some(DEFAULT_TOAST_DURATION))
    }

    /// Toasts every systemic failure published on `bus` as a persistent error.
    pub fn attach_to(&self, bus: &ErrorBus) -> Disposer {
        let notifications = self.clone();
        bus.subscribe(move |event| {
            notifications.enqueue(event.to_string(), Severity::Error, None);
        })
    }
}
