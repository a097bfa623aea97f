//! Test fixtures and payload builders.

use serde_json::{json, Value};

/// A desktop Chrome user agent.
pub const CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// The Googlebot user agent.
pub const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// A record payload with inline session-capped rules.
pub fn record_payload(tracking_key: &str, visitor_id: &str, session_id: &str) -> Value {
    json!({
        "trackingKey": tracking_key,
        "storeId": "shop-test.myshopify.com",
        "visitorId": visitor_id,
        "sessionId": session_id,
        "pageUrl": "https://shop.test/products/tea",
        "frequencyRules": {
            "enhancedTriggers": {
                "frequency_capping": {"maxDisplaysPerSession": 2}
            }
        }
    })
}

/// A record payload with explicit campaign and store rule documents.
pub fn record_payload_with_rules(
    tracking_key: &str,
    visitor_id: &str,
    session_id: &str,
    frequency_rules: Value,
    store_settings: Option<Value>,
) -> Value {
    let mut payload = json!({
        "trackingKey": tracking_key,
        "storeId": "shop-test.myshopify.com",
        "visitorId": visitor_id,
        "sessionId": session_id,
        "pageUrl": "https://shop.test/products/tea",
        "frequencyRules": frequency_rules,
    });
    if let Some(settings) = store_settings {
        payload["storeSettings"] = settings;
    }
    payload
}

/// A decision payload with inline rules.
pub fn decision_payload(tracking_key: &str, visitor_id: &str, session_id: &str) -> Value {
    json!({
        "trackingKey": tracking_key,
        "storeId": "shop-test.myshopify.com",
        "visitorId": visitor_id,
        "sessionId": session_id,
        "frequencyRules": {"maxDisplaysPerSession": 1}
    })
}

/// A unique visitor id per test, so shared global state never collides.
pub fn unique_visitor(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
