//! Cache descriptors for the dashboard's read-only panels.
//!
//! Every GET endpoint maps to one cache key, `"GET <path>"`, so all panels that
//! show the same data share one entry and one in-flight request. The cache holds
//! raw JSON; panels decode with [`CacheEntry::decode`](crate::core::query_cache::CacheEntry::decode).

use std::time::Duration;

use serde_json::Value;

use crate::core::query_cache::{RequestDescriptor, DEFAULT_MAX_RETRIES, DEFAULT_STALE_AFTER};
use crate::scanner::apicall::{
    ScannerApi, PATH_GOVERNANCE_STATUS, PATH_LIVE_THREATS, PATH_READINESS, PATH_TELEMETRY_SUMMARY,
    PATH_THREAT_MAP, PATH_THREAT_REGIONS, PATH_TRUSTED_DOMAINS,
};

pub const LIVE_THREATS_INTERVAL: Duration = Duration::from_secs(5);
pub const THREAT_MAP_INTERVAL: Duration = Duration::from_secs(10);
pub const READINESS_INTERVAL: Duration = Duration::from_secs(15);

/// Cache key of a GET endpoint.
pub fn query_key(path: &str) -> String {
    format!("GET {}", path)
}

/// Builds descriptors sharing one API handle and one freshness policy.
#[derive(Clone)]
pub struct DashboardQueries {
    api: ScannerApi,
    stale_after: Duration,
    max_retries: u32,
}

impl DashboardQueries {
    pub fn new(api: ScannerApi) -> Self {
        Self {
            api,
            stale_after: DEFAULT_STALE_AFTER,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_policy(mut self, stale_after: Duration, max_retries: u32) -> Self {
        self.stale_after = stale_after;
        self.max_retries = max_retries;
        self
    }

    fn get(&self, path: &'static str) -> RequestDescriptor<Value> {
        let client = self.api.client().clone();
        RequestDescriptor::new(query_key(path), move || {
            let client = client.clone();
            async move { client.get::<Value>(path).await }
        })
        .stale_after(self.stale_after)
        .max_retries(self.max_retries)
    }

    /// A descriptor refreshed by the live feed every `interval`.
    fn live(&self, path: &'static str, interval: Duration) -> RequestDescriptor<Value> {
        self.get(path).poll_every(interval)
    }

    pub fn threat_map(&self) -> RequestDescriptor<Value> {
        self.live(PATH_THREAT_MAP, THREAT_MAP_INTERVAL)
    }

    pub fn live_threats(&self) -> RequestDescriptor<Value> {
        self.live(PATH_LIVE_THREATS, LIVE_THREATS_INTERVAL)
    }

    pub fn readiness(&self) -> RequestDescriptor<Value> {
        self.live(PATH_READINESS, READINESS_INTERVAL)
    }

    pub fn threat_regions(&self) -> RequestDescriptor<Value> {
        self.get(PATH_THREAT_REGIONS)
    }

    pub fn telemetry_summary(&self) -> RequestDescriptor<Value> {
        self.get(PATH_TELEMETRY_SUMMARY)
    }

    pub fn trusted_domains(&self) -> RequestDescriptor<Value> {
        self.get(PATH_TRUSTED_DOMAINS)
    }

    pub fn governance_status(&self) -> RequestDescriptor<Value> {
        self.get(PATH_GOVERNANCE_STATUS)
    }

    /// Every descriptor that declares a poll interval.
    pub fn live_feeds(&self) -> Vec<RequestDescriptor<Value>> {
        vec![self.live_threats(), self.threat_map(), self.readiness()]
    }

    /// Every dashboard descriptor.
    pub fn all(&self) -> Vec<RequestDescriptor<Value>> {
        let mut all = self.live_feeds();
        all.extend([
            self.threat_regions(),
            self.telemetry_summary(),
            self.trusted_domains(),
            self.governance_status(),
        ]);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::ErrorBus;
    use crate::retrieve::admin_key::StaticCredential;
    use crate::retrieve::ky_http::{ApiClient, DEFAULT_TIMEOUT};
    use std::collections::HashSet;
    use std::sync::Arc;
    use url::Url;

    fn queries() -> DashboardQueries {
        let client = ApiClient::new(
            Url::parse("http://127.0.0.1:5000").unwrap(),
            DEFAULT_TIMEOUT,
            Arc::new(StaticCredential::default()),
            ErrorBus::new(),
        );
        DashboardQueries::new(ScannerApi::new(client))
    }

    #[test]
    fn keys_are_stable_and_distinct() {
        let q = queries();
        assert_eq!(q.live_threats().key, "GET /api/threats/live");
        assert_eq!(q.live_threats().key, q.live_threats().key);

        let keys: HashSet<String> = q.all().into_iter().map(|d| d.key).collect();
        assert_eq!(keys.len(), 7);
    }

    #[test]
    fn live_feeds_declare_intervals_and_share_the_default_policy() {
        let q = queries();
        let intervals: Vec<_> = q.live_feeds().iter().map(|d| d.poll_interval).collect();
        assert_eq!(
            intervals,
            vec![Some(LIVE_THREATS_INTERVAL), Some(THREAT_MAP_INTERVAL), Some(READINESS_INTERVAL)]
        );
        for d in q.all() {
            assert_eq!(d.stale_after, DEFAULT_STALE_AFTER, "{}", d.key);
            assert_eq!(d.max_retries, DEFAULT_MAX_RETRIES, "{}", d.key);
        }
        assert!(q.telemetry_summary().poll_interval.is_none());

        let tuned = q.with_policy(Duration::from_secs(5), 0);
        assert_eq!(tuned.live_threats().stale_after, Duration::from_secs(5));
        assert_eq!(tuned.live_threats().max_retries, 0);
    }
}
