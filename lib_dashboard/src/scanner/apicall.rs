//! # Scanner API Calls
//!
//! One method per endpoint of the scanner service, each decoding into its
//! typed model. Classification, credential injection and error broadcasting all
//! happen in the underlying [`ApiClient`].

use serde_json::Value;

use crate::retrieve::api_error::ApiError;
use crate::retrieve::ky_http::ApiClient;
use crate::scanner::models::{
    BatchScanRequest, BatchScanResponse, GovernanceStatus, LiveThreat, ReadinessReport,
    RegionCount, ScanRequest, ScanVerdict, ThreatMapItem, TrustedDomains,
};

pub const PATH_SCAN: &str = "/scan";
pub const PATH_BATCH_SCAN: &str = "/api/batch-scan";
pub const PATH_THREAT_MAP: &str = "/api/threats/map-data";
pub const PATH_LIVE_THREATS: &str = "/api/threats/live";
pub const PATH_THREAT_REGIONS: &str = "/api/threats/regions";
pub const PATH_TELEMETRY_SUMMARY: &str = "/api/telemetry/summary";
pub const PATH_READINESS: &str = "/health/ready";
pub const PATH_TRUSTED_DOMAINS: &str = "/api/trusted-domains";
pub const PATH_GOVERNANCE_STATUS: &str = "/api/governance/status";

/// Largest batch the service accepts; larger batches are rejected with a 400.
pub const MAX_BATCH_URLS: usize = 50;

/// Typed facade over the scanner endpoints.
#[derive(Clone)]
pub struct ScannerApi {
    client: ApiClient,
}

impl ScannerApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Submits one URL for analysis.
    pub async fn scan(&self, url: &str) -> Result<ScanVerdict, ApiError> {
        let body = ScanRequest {
            url: url.trim().to_string(),
        };
        self.client.post(PATH_SCAN, &body).await
    }

    /// Submits up to [`MAX_BATCH_URLS`] URLs. The service enforces the limit.
    pub async fn batch_scan(&self, urls: &[String]) -> Result<BatchScanResponse, ApiError> {
        if urls.len() > MAX_BATCH_URLS {
            log::warn!(
                "Submitting {} URLs; the service accepts at most {}",
                urls.len(),
                MAX_BATCH_URLS
            );
        }
        let body = BatchScanRequest { urls: urls.to_vec() };
        self.client.post(PATH_BATCH_SCAN, &body).await
    }

    pub async fn threat_map(&self) -> Result<Vec<ThreatMapItem>, ApiError> {
        self.client.get(PATH_THREAT_MAP).await
    }

    pub async fn live_threats(&self) -> Result<Vec<LiveThreat>, ApiError> {
        self.client.get(PATH_LIVE_THREATS).await
    }

    pub async fn threat_regions(&self) -> Result<Vec<RegionCount>, ApiError> {
        self.client.get(PATH_THREAT_REGIONS).await
    }

    /// Aggregate counters; the shape is owned by the service and passed through.
    pub async fn telemetry_summary(&self) -> Result<Value, ApiError> {
        self.client.get(PATH_TELEMETRY_SUMMARY).await
    }

    pub async fn readiness(&self) -> Result<ReadinessReport, ApiError> {
        self.client.get(PATH_READINESS).await
    }

    pub async fn trusted_domains(&self) -> Result<TrustedDomains, ApiError> {
        self.client.get(PATH_TRUSTED_DOMAINS).await
    }

    /// Privileged: carries the admin key when one is stored.
    pub async fn governance_status(&self) -> Result<GovernanceStatus, ApiError> {
        self.client.get(PATH_GOVERNANCE_STATUS).await
    }
}
