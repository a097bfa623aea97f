//! Application state shared across handlers.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use frequency_engine::FrequencyCapService;

use crate::middleware::throttle::{SharedThrottle, Throttle, ThrottleConfig};

/// Cache TTL for campaign config lookups (30 seconds).
const CONFIG_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum cache entries.
const CONFIG_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Frequency-capping configuration for one tracking key, as served by the
/// admin app.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignConfig {
    /// Raw campaign `targetRules` document.
    pub target_rules: Option<serde_json::Value>,
    /// Raw store `settings` document.
    pub store_settings: Option<serde_json::Value>,
    pub template_type: Option<String>,
}

impl CampaignConfig {
    /// Config used when the admin app cannot be reached: one display per
    /// session. Deny-safe against abuse, open enough that a legitimate
    /// campaign still shows.
    pub fn conservative() -> Self {
        Self {
            target_rules: Some(serde_json::json!({
                "enhancedTriggers": {
                    "frequency_capping": {"maxDisplaysPerSession": 1}
                }
            })),
            store_settings: None,
            template_type: None,
        }
    }
}

/// Campaign config client.
///
/// Calls the admin app's `/internal/campaigns/:trackingKey/frequency`
/// endpoint when the storefront payload does not inline the rules.
/// Caches responses for 30 seconds to keep the admin app off the
/// storefront's critical path.
#[derive(Clone)]
pub struct CampaignConfigClient {
    /// Admin app URL (e.g., "http://marquee-admin:3000")
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
    /// Config cache (store:tracking_key -> CampaignConfig)
    cache: Cache<String, CampaignConfig>,
    /// Whether to use mock mode (for testing)
    mock_mode: bool,
}

impl CampaignConfigClient {
    /// Creates a new campaign config client.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let mock_mode = base_url.is_empty() || base_url == "mock";

        Self {
            base_url,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("Failed to create HTTP client"),
            cache: Cache::builder()
                .max_capacity(CONFIG_CACHE_MAX_CAPACITY)
                .time_to_live(CONFIG_CACHE_TTL)
                .build(),
            mock_mode,
        }
    }

    /// Fetch config for a tracking key, falling back to the conservative
    /// config when the admin app is unreachable.
    ///
    /// Returns cached config if available, otherwise calls the admin app.
    pub async fn fetch(&self, store_id: &str, tracking_key: &str) -> CampaignConfig {
        let cache_key = format!("{}:{}", store_id, tracking_key);

        // Check cache first
        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!("Campaign config cache hit");
            return cached;
        }

        telemetry::metrics().policy_cache_misses.inc();

        // Get config (mock or real)
        let config = if self.mock_mode {
            CampaignConfig::default()
        } else {
            match self.remote_fetch(store_id, tracking_key).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        tracking_key = %tracking_key,
                        error = %e,
                        "Campaign config fetch failed, using conservative config"
                    );
                    return CampaignConfig::conservative();
                }
            }
        };

        // Cache the config
        self.cache.insert(cache_key, config.clone()).await;

        config
    }

    /// Call the admin app.
    async fn remote_fetch(
        &self,
        store_id: &str,
        tracking_key: &str,
    ) -> Result<CampaignConfig, String> {
        let url = format!(
            "{}/internal/campaigns/{}/frequency?shop={}",
            self.base_url, tracking_key, store_id
        );

        debug!(url = %url, "Fetching campaign config");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("admin app unavailable: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("admin app returned {}", response.status()));
        }

        response
            .json::<CampaignConfig>()
            .await
            .map_err(|e| format!("invalid config response: {}", e))
    }

    /// Invalidate cached config for a tracking key.
    pub async fn invalidate(&self, store_id: &str, tracking_key: &str) {
        self.cache
            .invalidate(&format!("{}:{}", store_id, tracking_key))
            .await;
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Decision and recording engine
    pub service: Arc<FrequencyCapService>,
    /// Campaign config client
    pub campaign_configs: CampaignConfigClient,
    /// Per-IP request throttle
    pub throttle: SharedThrottle,
}

impl AppState {
    pub fn new(service: Arc<FrequencyCapService>, admin_url: impl Into<String>) -> Self {
        Self {
            service,
            campaign_configs: CampaignConfigClient::new(admin_url),
            throttle: Arc::new(Throttle::new(ThrottleConfig::default())),
        }
    }

    /// Create with custom throttle config.
    pub fn with_throttle(
        service: Arc<FrequencyCapService>,
        admin_url: impl Into<String>,
        throttle_config: ThrottleConfig,
    ) -> Self {
        Self {
            service,
            campaign_configs: CampaignConfigClient::new(admin_url),
            throttle: Arc::new(Throttle::new(throttle_config)),
        }
    }
}
