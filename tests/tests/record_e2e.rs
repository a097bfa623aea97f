//! End-to-end tests for the display record pipeline.
//!
//! These validate the full flow over HTTP:
//! POST /storefront/impressions → FrequencyCapService → MemoryCounterStore
//! → MockSink (captures impressions)
//!
//! The MockSink implements the same EventSink trait as the real
//! ClickHouseSink, so every production code path runs except the actual
//! ClickHouse transport.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::json;

/// Full pipeline: two displays land, the third is rejected at the cap,
/// and exactly two impressions reach the sink.
#[tokio::test]
async fn test_session_cap_enforced_end_to_end() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");

    for i in 0..2 {
        let response = server
            .post("/storefront/impressions")
            .add_header("User-Agent", fixtures::CHROME_UA)
            .json(&fixtures::record_payload("cmp-1", &visitor, "sess-1"))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["outcome"], "recorded", "display {} should record", i);
        assert_eq!(body["displayed"], true);
    }

    let response = server
        .post("/storefront/impressions")
        .add_header("User-Agent", fixtures::CHROME_UA)
        .json(&fixtures::record_payload("cmp-1", &visitor, "sess-1"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["displayed"], false);
    assert_eq!(body["reason"], "SESSION_CAP");

    // Only accepted displays produce impressions.
    ctx.mock_sink.wait_for_events(2).await;
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    assert_eq!(ctx.captured_events().len(), 2);

    let events = ctx.captured_events();
    assert!(events.iter().all(|e| e.campaign_id == "cmp-1"));
    assert!(events.iter().all(|e| e.event_type.as_str() == "VIEW"));
    assert!(events.iter().all(|e| !e.suspected_bot));
    assert!(events.iter().all(|e| e.device_type == "desktop"));
}

/// Campaign cap 2 + store cap 5 → effective 2; the store-side document
/// cannot loosen the campaign cap.
#[tokio::test]
async fn test_store_settings_merge_end_to_end() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");
    let payload = fixtures::record_payload_with_rules(
        "cmp-merge",
        &visitor,
        "sess-1",
        json!({"enhancedTriggers": {"frequency_capping": {"maxDisplaysPerSession": 2}}}),
        Some(json!({"frequencyCapping": {"maxDisplaysPerSession": 5}})),
    );

    for _ in 0..2 {
        let response = server.post("/storefront/impressions").json(&payload).await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["outcome"], "recorded");
    }

    let response = server.post("/storefront/impressions").json(&payload).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["reason"], "SESSION_CAP");
}

/// Bot traffic: the impression is written with the flag, and the counters
/// stay untouched so crawlers cannot exhaust the cap.
#[tokio::test]
async fn test_bot_traffic_flagged_and_kept() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");

    for _ in 0..5 {
        let response = server
            .post("/storefront/impressions")
            .add_header("User-Agent", fixtures::GOOGLEBOT_UA)
            .json(&fixtures::record_payload("cmp-bot", &visitor, "sess-1"))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        // Crawlers see the popup; they just never consume a slot.
        assert_eq!(body["outcome"], "recorded");
    }

    ctx.mock_sink.wait_for_events(5).await;
    let events = ctx.captured_events();
    assert_eq!(events.len(), 5, "flagged impressions are never dropped");
    assert!(events.iter().all(|e| e.suspected_bot));

    // A real visitor still has the full cap available afterwards.
    let response = server
        .post("/storefront/impressions")
        .add_header("User-Agent", fixtures::CHROME_UA)
        .json(&fixtures::record_payload("cmp-bot", &visitor, "sess-1"))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "recorded");
}

/// Decision-only calls never consume display slots.
#[tokio::test]
async fn test_decision_endpoint_does_not_consume() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");

    for _ in 0..4 {
        let response = server
            .post("/storefront/decisions")
            .json(&fixtures::decision_payload("cmp-dec", &visitor, "sess-1"))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["allowed"], true);
    }

    // The single session slot is still free for the record call.
    let payload = fixtures::record_payload_with_rules(
        "cmp-dec",
        &visitor,
        "sess-1",
        json!({"maxDisplaysPerSession": 1}),
        None,
    );
    let response = server.post("/storefront/impressions").json(&payload).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "recorded");

    // After the record call the decision flips to denied.
    let response = server
        .post("/storefront/decisions")
        .json(&fixtures::decision_payload("cmp-dec", &visitor, "sess-1"))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "SESSION_CAP");
}

/// A new session id rolls the session window while lifetime history stays.
#[tokio::test]
async fn test_new_session_resets_session_cap() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");
    let rules = json!({"maxDisplaysPerSession": 1});

    let payload =
        fixtures::record_payload_with_rules("cmp-roll", &visitor, "sess-1", rules.clone(), None);
    let response = server.post("/storefront/impressions").json(&payload).await;
    assert_eq!(response.json::<serde_json::Value>()["outcome"], "recorded");

    let response = server.post("/storefront/impressions").json(&payload).await;
    assert_eq!(response.json::<serde_json::Value>()["reason"], "SESSION_CAP");

    let payload = fixtures::record_payload_with_rules("cmp-roll", &visitor, "sess-2", rules, None);
    let response = server.post("/storefront/impressions").json(&payload).await;
    assert_eq!(response.json::<serde_json::Value>()["outcome"], "recorded");
}

/// The bare capping block (storefront SDK shape) works like the full
/// targetRules document (admin app shape).
#[tokio::test]
async fn test_bare_rules_block_accepted() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let visitor = fixtures::unique_visitor("visitor");
    let payload = fixtures::record_payload_with_rules(
        "cmp-bare",
        &visitor,
        "sess-1",
        json!({"maxDisplaysPerSession": 1}),
        None,
    );

    let response = server.post("/storefront/impressions").json(&payload).await;
    assert_eq!(response.json::<serde_json::Value>()["outcome"], "recorded");

    let response = server.post("/storefront/impressions").json(&payload).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["reason"], "SESSION_CAP");
}
