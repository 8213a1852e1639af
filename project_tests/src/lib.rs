//! # Integration Test Harness
//!
//! Shared fixtures for the end-to-end tests under `tests/`: a mock scanner
//! service on a local socket and clients pointed at it.

use std::sync::Arc;
use std::time::Duration;

use lib_dashboard::core::dispatcher::ErrorBus;
use lib_dashboard::retrieve::admin_key::StaticCredential;
use lib_dashboard::retrieve::api_error::ErrorEvent;
use lib_dashboard::retrieve::ky_http::ApiClient;
use lib_dashboard::{DashboardClient, SyncConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;
use wiremock::MockServer;

/// A transport client against `server`, with its bus tapped into a channel.
pub struct Harness {
    pub client: ApiClient,
    pub events: UnboundedReceiver<ErrorEvent>,
    // Keeps the channel listener registered.
    _tap: lib_dashboard::core::dispatcher::Disposer,
}

impl Harness {
    pub fn new(server: &MockServer, admin_key: Option<&str>, timeout: Duration) -> Self {
        let bus = ErrorBus::new();
        let (tap, events) = bus.subscribe_channel();
        let client = ApiClient::new(
            base_url(server),
            timeout,
            Arc::new(StaticCredential(admin_key.map(str::to_string))),
            bus,
        );
        Self {
            client,
            events,
            _tap: tap,
        }
    }

    /// Every event broadcast so far.
    pub fn drain_events(&mut self) -> Vec<ErrorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn base_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap_or_else(|e| panic!("mock server uri: {}", e))
}

/// A dashboard client against `server`, with no stored credential.
pub fn dashboard(server: &MockServer) -> DashboardClient {
    let config = SyncConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        ..SyncConfig::default()
    };
    DashboardClient::with_credentials(config, Arc::new(StaticCredential::default()))
        .unwrap_or_else(|e| panic!("dashboard client: {}", e))
}
