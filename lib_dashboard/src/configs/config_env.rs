use std::path::PathBuf;
use std::time::Duration;
use std::{env, fmt};

use thiserror::Error;
use url::Url;

use crate::core::query_cache::{DEFAULT_MAX_RETRIES, DEFAULT_STALE_AFTER};
use crate::retrieve::ky_http::DEFAULT_TIMEOUT;

/// Base URL of the scanner API. Empty means "same origin as the dashboard".
pub const ENV_BASE_URL: &str = "SCANNER_API_BASE_URL";
/// Optional override of the request timeout, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "SCANNER_API_TIMEOUT_MS";
/// Optional location of the persisted settings blob.
pub const ENV_SETTINGS_PATH: &str = "SCANNER_SETTINGS_PATH";

/// Origin the scanner service listens on when the dashboard is served by it.
pub const SAME_ORIGIN: &str = "http://127.0.0.1:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {name} is not a valid number: {value}")]
    InvalidNumber { name: String, value: String },

    #[error("Invalid base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Runtime configuration of the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub stale_after: Duration,
    pub max_retries: u32,
    /// `None` uses the platform config directory.
    pub settings_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            stale_after: DEFAULT_STALE_AFTER,
            max_retries: DEFAULT_MAX_RETRIES,
            settings_path: None,
        }
    }
}

impl fmt::Display for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncConfig
    Base URL: {},
    Timeout: {} ms,
    Stale after: {} ms,
    Max retries: {},
    Settings path: {:?}
",
            if self.base_url.is_empty() { "(same origin)" } else { self.base_url.as_str() },
            self.timeout.as_millis(),
            self.stale_after.as_millis(),
            self.max_retries,
            self.settings_path
        )
    }
}

impl SyncConfig {
    /// Reads the configuration once from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup(ENV_BASE_URL) {
            config.base_url = base.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: ENV_TIMEOUT_MS.to_string(),
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_millis(ms);
        }

        if let Some(path) = lookup(ENV_SETTINGS_PATH).filter(|p| !p.trim().is_empty()) {
            config.settings_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// The absolute base URL, with an empty setting resolved to [`SAME_ORIGIN`].
    pub fn resolved_base_url(&self) -> Result<Url, ConfigError> {
        let raw = if self.base_url.is_empty() { SAME_ORIGIN } else { self.base_url.as_str() };
        Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            source,
        })
    }
}
