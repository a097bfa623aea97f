//! Error handling tests for the record and decision endpoints.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::json;

use api::middleware::throttle::ThrottleConfig;

/// Missing tracking key is the caller's fault: 400 with INPUT_001.
#[tokio::test]
async fn test_missing_tracking_key_is_input_001() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/storefront/impressions")
        .json(&json!({
            "storeId": "shop-test.myshopify.com",
            "visitorId": fixtures::unique_visitor("visitor"),
            "sessionId": "sess-1",
            "pageUrl": "https://shop.test/"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INPUT_001");
}

/// Missing visitor id: 400 with INPUT_002.
#[tokio::test]
async fn test_missing_visitor_is_input_002() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/storefront/impressions")
        .json(&json!({
            "trackingKey": "cmp-1",
            "storeId": "shop-test.myshopify.com",
            "sessionId": "sess-1",
            "pageUrl": "https://shop.test/"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INPUT_002");
}

/// Oversized identifier fields fail payload validation with INPUT_003.
#[tokio::test]
async fn test_oversized_field_is_input_003() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/storefront/impressions")
        .json(&json!({
            "trackingKey": "x".repeat(500),
            "storeId": "shop-test.myshopify.com",
            "visitorId": fixtures::unique_visitor("visitor"),
            "sessionId": "sess-1",
            "pageUrl": "https://shop.test/"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INPUT_003");
}

/// A body that is not JSON at all is rejected before reaching the engine.
#[tokio::test]
async fn test_non_json_body_is_bad_request() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/storefront/impressions")
        .content_type("application/json")
        .bytes(bytes::Bytes::from_static(b"not json at all"))
        .await;

    response.assert_status_bad_request();
}

/// Malformed capping rules degrade to the conservative default instead of
/// failing the request: one display per session.
#[tokio::test]
async fn test_malformed_rules_conservative_fallback() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");
    let payload = fixtures::record_payload_with_rules(
        "cmp-bad",
        &visitor,
        "sess-1",
        json!({"enhancedTriggers": {"frequency_capping": {"maxDisplaysPerSession": "two"}}}),
        None,
    );

    let response = server.post("/storefront/impressions").json(&payload).await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["outcome"], "recorded");

    let response = server.post("/storefront/impressions").json(&payload).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["reason"], "SESSION_CAP");
}

/// A sink outage never fails the request or changes the outcome.
#[tokio::test]
async fn test_sink_failure_never_blocks_display() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    ctx.mock_sink.set_should_fail(true);

    let visitor = fixtures::unique_visitor("visitor");
    let response = server
        .post("/storefront/impressions")
        .json(&fixtures::record_payload("cmp-sink", &visitor, "sess-1"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["outcome"], "recorded");
}

/// The per-IP throttle returns 429 with a Retry-After header.
#[tokio::test]
async fn test_throttle_returns_rate_001() {
    let ctx = TestContext::with_throttle(ThrottleConfig { rate: 1, burst: 2 });
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");

    for _ in 0..2 {
        let response = server
            .post("/storefront/impressions")
            .add_header("X-Forwarded-For", "203.0.113.9")
            .json(&fixtures::record_payload("cmp-thr", &visitor, "sess-1"))
            .await;
        response.assert_status_ok();
    }

    let response = server
        .post("/storefront/impressions")
        .add_header("X-Forwarded-For", "203.0.113.9")
        .json(&fixtures::record_payload("cmp-thr", &visitor, "sess-1"))
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get("Retry-After")
        .expect("Retry-After header present");
    assert_eq!(retry_after, "1");
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "RATE_001");
}

/// Decision endpoint applies the same input error codes.
#[tokio::test]
async fn test_decision_missing_tracking_key() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/storefront/decisions")
        .json(&json!({
            "storeId": "shop-test.myshopify.com",
            "visitorId": fixtures::unique_visitor("visitor"),
            "sessionId": "sess-1"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INPUT_001");
}
