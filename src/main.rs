//! Marquee Frequency-Capping Engine
//!
//! Storefront-facing decision service handling:
//! - per-visitor display caps (session, day, lifetime, cooldown, store-wide)
//! - atomic impression recording with fail-open degradation
//! - durable impression analytics via buffered ClickHouse writes
//! - bot screening so automated traffic cannot exhaust caps

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use analytics_sink::{ClickHouseClient, ClickHouseConfig, ClickHouseSink, EventSink, SinkConfig};
use api::middleware::throttle::ThrottleConfig;
use api::{router, AppState};
use counter_store::{CounterStore, MemoryCounterStore, StoreConfig};
use frequency_engine::{EngineConfig, FrequencyCapService};
use telemetry::{health, init_tracing_from_env, metrics};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Admin app URL for campaign config lookups
    #[serde(default = "default_admin_url")]
    admin_url: String,

    /// Internal metrics flush interval in seconds
    #[serde(default = "default_metrics_flush_secs")]
    metrics_flush_secs: u64,

    #[serde(default)]
    engine: EngineConfig,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    sink: SinkConfig,

    #[serde(default)]
    throttle: ThrottleConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_admin_url() -> String {
    "http://marquee-admin:3000".to_string()
}

fn default_metrics_flush_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_url: default_admin_url(),
            metrics_flush_secs: default_metrics_flush_secs(),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            sink: SinkConfig::default(),
            throttle: ThrottleConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Marquee Frequency-Capping Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;

    info!(
        clickhouse_url = %config.clickhouse.url,
        store_timeout_ms = config.engine.store_timeout_ms,
        "Loaded configuration"
    );

    // Initialize the counter store and its sweep task
    let store = Arc::new(MemoryCounterStore::new(config.store.clone()));
    let _store_cleanup = store.start_cleanup_task();
    health().counter_store.set_healthy();

    // Initialize ClickHouse client
    let clickhouse = ClickHouseClient::new(config.clickhouse.clone())
        .context("Failed to create ClickHouse client")?;

    // Initialize ClickHouse schema
    if let Err(e) = analytics_sink::health::init_schema(&clickhouse).await {
        error!("Failed to initialize ClickHouse schema: {}", e);
        // Continue anyway - schema might already exist
    }

    // Check ClickHouse health and update status
    if analytics_sink::health::check_connection(&clickhouse).await {
        health().clickhouse.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().clickhouse.set_unhealthy("Connection failed");
        error!("ClickHouse connection: unhealthy (impressions will retry)");
    }

    // Buffered impression sink and its flush task
    let sink = Arc::new(ClickHouseSink::new(clickhouse.clone(), config.sink.clone()));
    let _sink_flush = sink.start_flush_task();

    // Decision/record engine
    let service = Arc::new(FrequencyCapService::new(
        store.clone() as Arc<dyn CounterStore>,
        sink.clone(),
        config.engine.clone(),
    ));

    // Create application state
    let state = AppState::with_throttle(service, &config.admin_url, config.throttle.clone());

    // Start throttle cleanup background task
    let _throttle_cleanup = state.throttle.start_cleanup_task();
    info!("Started throttle cleanup task (every 5 minutes)");

    // Start internal metrics flush task
    let _metrics_flush = start_metrics_flush(clickhouse.clone(), config.metrics_flush_secs);

    // Create router
    let app = router(state);

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cleanup
    info!("Shutting down...");

    // Flush remaining impressions
    if let Err(e) = sink.flush().await {
        error!("Failed to flush impression sink: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("MARQUEE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested ClickHouse config from environment
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(url) = std::env::var("MARQUEE_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("MARQUEE_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("MARQUEE_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("MARQUEE_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    // Admin URL override
    if let Ok(admin_url) = std::env::var("MARQUEE_ADMIN_URL") {
        config.admin_url = admin_url;
    }

    Ok(config)
}

/// Periodically flush internal metrics snapshots to ClickHouse.
fn start_metrics_flush(
    clickhouse: ClickHouseClient,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let snapshot = metrics().snapshot();
            if let Err(e) = analytics_sink::insert::insert_metrics(&clickhouse, snapshot).await {
                error!("Failed to flush internal metrics: {}", e);
            }
        }
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
