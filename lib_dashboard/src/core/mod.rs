//! # Sync Core
//!
//! The state machines that sit between the transport and the dashboard panels.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: The error bus. Fans every systemic transport failure out
//!   to all current listeners, isolating them from each other's panics.
//!
//! - **`scheduler`**: Cancellable one-shot and periodic tasks on the tokio
//!   runtime, behind a trait so the coordinators never touch timers directly.
//!
//! - **`query_cache`**: Keyed cache of server reads. Coalesces concurrent
//!   requests for one key, tracks staleness, retries once and keeps the last
//!   good data through a failure.
//!
//! - **`registry`**: The live feed coordinator. Owns the polling subscriptions
//!   and the single live/pause switch that gates them.
//!
//! - **`notifications`**: The toast queue with per-item expiry.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

/// Error broadcast bus.
pub mod dispatcher;
/// Toast queue with timed expiry.
pub mod notifications;
/// Keyed query cache with coalescing and stale-while-error.
pub mod query_cache;
/// Live feed coordinator.
pub mod registry;
/// Cancellable timers.
pub mod scheduler;

// --- Public API Re-exports ---
pub use dispatcher::{Disposer, ErrorBus};
pub use notifications::{Notification, Notifications, Severity};
pub use query_cache::{CacheEntry, CacheStatus, QueryCache, RequestDescriptor};
pub use registry::{LiveFeed, PollHandle};
pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
