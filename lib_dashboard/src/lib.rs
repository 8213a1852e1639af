//! Client-side sync layer of the phishing scanner dashboard.
//!
//! Talks to the scanner service over HTTP, caches and polls its read endpoints,
//! broadcasts systemic failures and turns them into toasts.

pub mod configs;
pub mod core;
pub mod dashboard;
pub mod loggers;
pub mod retrieve;
pub mod scanner;

pub use configs::config_env::{ConfigError, SyncConfig};
pub use configs::settings_store::{SettingsError, SettingsStore};
pub use dashboard::{DashboardClient, DashboardError};
pub use loggers::setup_logging;
