//! # Error Broadcast Bus
//!
//! The `ErrorBus` fans classified transport failures out to every interested
//! listener (toast bridges, status bars, loggers) without the transport knowing
//! who they are.
//!
//! ## Delivery Rules:
//!
//! 1.  **Synchronous Fan-out**: `publish` invokes every listener subscribed at the
//!     moment of the call, in subscription order, before returning.
//! 2.  **No Replay**: events are not retained. A listener subscribed after a
//!     publish never sees that event.
//! 3.  **Listener Isolation**: a panicking listener is logged and skipped; the
//!     remaining listeners still receive the event.
//! 4.  **Explicit Teardown**: `subscribe` hands back a [`Disposer`]. Calling it
//!     removes exactly that listener; calling it again does nothing.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::retrieve::api_error::ErrorEvent;

type Listener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    /// Listener ids are allocated monotonically, so map order is subscription order.
    listeners: BTreeMap<u64, Listener>,
    next_id: u64,
}

/// # Error Bus
///
/// Owns the listener set. Cloning the bus yields another handle to the same set.
#[derive(Clone, Default)]
pub struct ErrorBus {
    inner: Arc<Mutex<BusInner>>,
}

/// Removes one listener from the bus it was registered on.
///
/// Holds only a weak reference, so an outstanding disposer never keeps a bus alive.
pub struct Disposer {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
}

impl Disposer {
    /// Unsubscribes the listener. Safe to call any number of times.
    pub fn dispose(&self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut inner = bus.lock().unwrap_or_else(|e| e.into_inner());
            if inner.listeners.remove(&self.id).is_some() {
                log::debug!("Error bus listener {} disposed", self.id);
            }
        }
    }
}

impl ErrorBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its disposer.
    pub fn subscribe<F>(&self, listener: F) -> Disposer
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));
        log::debug!("Error bus listener {} subscribed", id);

        Disposer {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Registers a listener that forwards every event into an unbounded channel.
    ///
    /// Lets an async task consume failures at its own pace. The listener stays
    /// subscribed until disposed; sends to a dropped receiver are ignored.
    pub fn subscribe_channel(&self) -> (Disposer, mpsc::UnboundedReceiver<ErrorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let disposer = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (disposer, rx)
    }

    /// Delivers `event` to every current listener, in subscription order.
    pub fn publish(&self, event: &ErrorEvent) {
        // Snapshot so listeners may subscribe or dispose while being called.
        let listeners: Vec<(u64, Listener)> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .listeners
                .iter()
                .map(|(id, l)| (*id, Arc::clone(l)))
                .collect()
        };

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("Error bus listener {} panicked while handling: {}", id, event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }
}
