//! Health endpoint tests.

use axum_test::TestServer;
use integration_tests::setup::TestContext;

#[tokio::test]
async fn test_health_reports_components() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["counter_store_connected"], true);
    assert!(body["status"].is_string());
}

#[tokio::test]
async fn test_readiness_follows_counter_store() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health/ready").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_liveness_always_ok() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health/live").await;
    response.assert_status_ok();
}
