//! Response models of the scanner service.
//!
//! Fields the dashboard does not depend on are optional or defaulted so that a
//! service upgrade adding fields never breaks decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /scan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

/// Body of `POST /api/batch-scan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScanRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    Suspicious,
    Phishing,
    /// Per-URL failure inside a batch.
    Error,
}

/// Result of a single URL analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanVerdict {
    #[serde(default)]
    pub success: bool,
    pub verdict: Verdict,
    pub risk_score: f64,
    #[serde(default)]
    pub is_trusted_domain: bool,
    #[serde(default)]
    pub ml_bypassed: bool,
    #[serde(default)]
    pub explanation: Value,
    #[serde(default)]
    pub warnings: Vec<Value>,
    pub url: String,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub trust_info: Option<Value>,
    #[serde(default)]
    pub network_issues: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub url: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub is_trusted_domain: Option<bool>,
    #[serde(default)]
    pub ml_bypassed: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScanResponse {
    #[serde(default)]
    pub success: bool,
    pub results: Vec<BatchItem>,
    pub total: u64,
    #[serde(default)]
    pub phishing_count: u64,
    #[serde(default)]
    pub safe_count: u64,
    #[serde(default)]
    pub suspicious_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatSeverity {
    Critical,
    Suspicious,
    Safe,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One attack arc on the threat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatMapItem {
    pub threat_id: String,
    #[serde(rename = "type")]
    pub threat_type: String,
    pub severity: ThreatSeverity,
    pub source: GeoPoint,
    pub target: GeoPoint,
    pub attack_vector: String,
    pub timestamp: DateTime<Utc>,
}

/// One row of the live threat ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveThreat {
    pub id: String,
    pub label: String,
    pub entity: String,
    pub location: String,
    pub severity: ThreatSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCount {
    pub region: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedDomains {
    pub sample_trusted_domains: Vec<String>,
    pub total_trusted: u64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Service readiness as reported by `/health/ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Readiness {
    Ready,
    /// The governance safety budget froze the service.
    Frozen,
    Other(String),
}

impl From<String> for Readiness {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ready" => Readiness::Ready,
            "frozen" => Readiness::Frozen,
            _ => Readiness::Other(raw),
        }
    }
}

impl From<Readiness> for String {
    fn from(r: Readiness) -> Self {
        match r {
            Readiness::Ready => "ready".to_string(),
            Readiness::Frozen => "frozen".to_string(),
            Readiness::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub status: Readiness,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Governance safety status; only `is_frozen` is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceStatus {
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_scan_verdict() {
        let verdict: ScanVerdict = serde_json::from_value(json!({
            "success": true,
            "verdict": "PHISHING",
            "risk_score": 91.4,
            "is_trusted_domain": false,
            "ml_bypassed": false,
            "explanation": {"top_features": []},
            "warnings": [],
            "url": "http://secure-paypal-verify.net",
            "risk_level": "High Risk",
            "latency_ms": 42.1
        }))
        .unwrap();
        assert_eq!(verdict.verdict, Verdict::Phishing);
        assert_eq!(verdict.risk_level.as_deref(), Some("High Risk"));
        assert!(verdict.trust_info.is_none());
    }

    #[test]
    fn decodes_threat_feeds() {
        let item: ThreatMapItem = serde_json::from_value(json!({
            "threat_id": "THR-0001-101500",
            "type": "credential_harvesting",
            "severity": "critical",
            "source": {"lat": 55.75, "lng": 37.62},
            "target": {"lat": 40.71, "lng": -74.01},
            "attack_vector": "email",
            "timestamp": "2024-05-01T10:15:00.123456Z"
        }))
        .unwrap();
        assert_eq!(item.severity, ThreatSeverity::Critical);
        assert_eq!(item.threat_type, "credential_harvesting");

        let live: LiveThreat = serde_json::from_value(json!({
            "id": "LIVE-101500-0",
            "label": "Phishing Kit",
            "entity": "login-microsoft-secure.com",
            "location": "Lagos, NG",
            "severity": "suspicious",
            "timestamp": "2024-05-01T10:15:00Z"
        }))
        .unwrap();
        assert_eq!(live.severity, ThreatSeverity::Suspicious);
    }

    #[test]
    fn readiness_keeps_unknown_states() {
        let ready: ReadinessReport = serde_json::from_value(json!({"status": "ready"})).unwrap();
        assert_eq!(ready.status, Readiness::Ready);

        let frozen: ReadinessReport =
            serde_json::from_value(json!({"status": "frozen", "reason": "budget exceeded"}))
                .unwrap();
        assert_eq!(frozen.status, Readiness::Frozen);
        assert_eq!(frozen.extra.get("reason"), Some(&json!("budget exceeded")));

        let other: ReadinessReport = serde_json::from_value(json!({"status": "warming"})).unwrap();
        assert_eq!(other.status, Readiness::Other("warming".into()));
    }

    #[test]
    fn batch_items_may_carry_errors() {
        let batch: BatchScanResponse = serde_json::from_value(json!({
            "success": true,
            "results": [
                {
                    "url": "https://github.com",
                    "verdict": "SAFE",
                    "risk_score": 2.0,
                    "is_trusted_domain": true,
                    "ml_bypassed": true
                },
                {"url": "http://bad", "verdict": "ERROR", "error": "timeout"}
            ],
            "total": 2,
            "phishing_count": 0,
            "safe_count": 1,
            "suspicious_count": 0
        }))
        .unwrap();
        assert_eq!(batch.results[1].verdict, Verdict::Error);
        assert_eq!(batch.results[1].error.as_deref(), Some("timeout"));
    }
}
