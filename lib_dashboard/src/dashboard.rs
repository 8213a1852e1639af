//! # Dashboard Client
//!
//! Wires the sync layer together for one dashboard session: a shared error
//! bus, the transport, the query cache, the live feed coordinator and the
//! notification queue, with systemic failures surfaced as toasts.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::configs::config_env::{ConfigError, SyncConfig};
use crate::configs::settings_store::{SettingsError, SettingsStore};
use crate::core::dispatcher::{Disposer, ErrorBus};
use crate::core::notifications::Notifications;
use crate::core::query_cache::QueryCache;
use crate::core::registry::{LiveFeed, PollHandle};
use crate::core::scheduler::{Scheduler, TokioScheduler};
use crate::retrieve::admin_key::CredentialProvider;
use crate::retrieve::api_error::ApiError;
use crate::retrieve::ky_http::ApiClient;
use crate::scanner::apicall::{ScannerApi, PATH_TELEMETRY_SUMMARY};
use crate::scanner::models::{ScanVerdict, Verdict};
use crate::scanner::queries::{query_key, DashboardQueries};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub struct DashboardClient {
    config: SyncConfig,
    bus: ErrorBus,
    api: ScannerApi,
    cache: QueryCache<Value>,
    feeds: LiveFeed<Value>,
    notifications: Notifications,
    queries: DashboardQueries,
    _toasts: Disposer,
}

impl DashboardClient {
    /// Builds a client whose admin credential comes from the settings store.
    pub fn new(config: SyncConfig) -> Result<Self, DashboardError> {
        let path = config
            .settings_path
            .clone()
            .unwrap_or_else(SettingsStore::default_path);
        let store = SettingsStore::open(&path)?;
        log::debug!("Using settings at {}", store.path().display());
        Self::with_credentials(config, Arc::new(store))
    }

    pub fn from_env() -> Result<Self, DashboardError> {
        Self::new(SyncConfig::from_env()?)
    }

    pub fn with_credentials(
        config: SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, DashboardError> {
        let base_url = config.resolved_base_url()?;
        let bus = ErrorBus::new();
        let client = ApiClient::new(base_url, config.timeout, credentials, bus.clone());
        let api = ScannerApi::new(client);

        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);
        let cache = QueryCache::new();
        let feeds = LiveFeed::new(cache.clone(), Arc::clone(&scheduler));
        let notifications = Notifications::new(scheduler);
        let toasts = notifications.attach_to(&bus);

        let queries = DashboardQueries::new(api.clone())
            .with_policy(config.stale_after, config.max_retries);

        log::info!("Dashboard client ready against {}", api.client().base_url());

        Ok(Self {
            config,
            bus,
            api,
            cache,
            feeds,
            notifications,
            queries,
            _toasts: toasts,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn bus(&self) -> &ErrorBus {
        &self.bus
    }

    pub fn api(&self) -> &ScannerApi {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache<Value> {
        &self.cache
    }

    pub fn feeds(&self) -> &LiveFeed<Value> {
        &self.feeds
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn queries(&self) -> &DashboardQueries {
        &self.queries
    }

    /// Starts polling every descriptor that declares an interval.
    pub fn start_live_feeds(&self) -> Vec<PollHandle> {
        self.queries
            .live_feeds()
            .into_iter()
            .filter_map(|descriptor| {
                let interval = descriptor.poll_interval?;
                Some(self.feeds.start_polling(descriptor, interval))
            })
            .collect()
    }

    /// Scans one URL, toasts the verdict and marks the telemetry summary stale.
    ///
    /// Failures are returned to the caller; systemic ones are also toasted via
    /// the error bus.
    pub async fn scan_url(&self, url: &str) -> Result<ScanVerdict, ApiError> {
        let verdict = self.api.scan(url).await?;

        let message = format!(
            "{}: {} (risk {:.1})",
            verdict.url,
            verdict_label(verdict.verdict),
            verdict.risk_score
        );
        match verdict.verdict {
            Verdict::Safe => self.notifications.success(message),
            Verdict::Suspicious => self.notifications.warning(message),
            Verdict::Phishing | Verdict::Error => self.notifications.error(message),
        };

        self.cache.invalidate(&query_key(PATH_TELEMETRY_SUMMARY));
        Ok(verdict)
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Safe => "safe",
        Verdict::Suspicious => "suspicious",
        Verdict::Phishing => "phishing",
        Verdict::Error => "scan error",
    }
}
