//! Typed endpoint calls against a mock scanner service.

use std::time::Duration;

use lib_dashboard::scanner::models::{Readiness, ThreatSeverity, Verdict};
use lib_dashboard::scanner::ScannerApi;
use project_tests::Harness;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> ScannerApi {
    ScannerApi::new(Harness::new(server, None, Duration::from_secs(5)).client)
}

#[tokio::test]
async fn scan_posts_the_trimmed_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .and(body_json(json!({"url": "http://secure-paypal-verify.net"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "verdict": "PHISHING",
            "risk_score": 91.4,
            "is_trusted_domain": false,
            "ml_bypassed": false,
            "explanation": {},
            "warnings": [],
            "url": "http://secure-paypal-verify.net"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verdict = api(&server).scan("  http://secure-paypal-verify.net ").await.unwrap();
    assert_eq!(verdict.verdict, Verdict::Phishing);
    assert!(verdict.risk_score > 90.0);
}

#[tokio::test]
async fn batch_scan_returns_per_url_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/batch-scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "results": [
                {"url": "https://github.com", "verdict": "SAFE", "risk_score": 1.0},
                {"url": "http://x", "verdict": "ERROR", "error": "unreachable"}
            ],
            "total": 2,
            "phishing_count": 0,
            "safe_count": 1,
            "suspicious_count": 0
        })))
        .mount(&server)
        .await;

    let urls = vec!["https://github.com".to_string(), "http://x".to_string()];
    let batch = api(&server).batch_scan(&urls).await.unwrap();
    assert_eq!(batch.total, 2);
    assert_eq!(batch.results[1].verdict, Verdict::Error);
}

#[tokio::test]
async fn read_endpoints_decode() {
    let server = MockServer::start().await;
    Mock::given(path("/api/threats/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "LIVE-1",
            "label": "Credential Harvest",
            "entity": "paypa1-login.com",
            "location": "Moscow, RU",
            "severity": "critical",
            "timestamp": "2024-05-01T10:15:00Z"
        }])))
        .mount(&server)
        .await;
    Mock::given(path("/api/threats/regions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"region": "North America", "count": 12},
            {"region": "Europe", "count": 7}
        ])))
        .mount(&server)
        .await;
    Mock::given(path("/health/ready"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "frozen"})))
        .mount(&server)
        .await;

    let api = api(&server);

    let live = api.live_threats().await.unwrap();
    assert_eq!(live[0].severity, ThreatSeverity::Critical);

    let regions = api.threat_regions().await.unwrap();
    assert_eq!(regions.iter().map(|r| r.count).sum::<u64>(), 19);

    // A frozen service answers readiness with 503; the body is kept on the error.
    let err = api.readiness().await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    let report: lib_dashboard::scanner::models::ReadinessReport =
        serde_json::from_value(err.details().clone()).unwrap();
    assert_eq!(report.status, Readiness::Frozen);
}
