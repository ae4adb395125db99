//! Webhook Relay Server
//!
//! Receives inbound webhook calls per tenant and fans them out to the fixed
//! primary receiver plus tenant-configured secondary endpoints. Provides the
//! admin API for endpoint management and delivery logs, health probes, and
//! Prometheus metrics.
//!
//! Configuration is environment-based (`.env` supported):
//! - `WR_PRIMARY_BASE_URL` (required): base URL of the main system
//! - `WR_HOST` / `WR_PORT`: bind address (default 0.0.0.0:8080)
//! - `WR_API_KEY`: Bearer key for the admin API (unset: admin rejected)
//! - `DATABASE_URL`: PostgreSQL store; unset falls back to in-memory
//! - `WR_DEV_MODE`: include error detail in acks
//! - `WR_REGISTRY_TIMEOUT_MS`, `WR_RETRY_DELAY_MS`, `WR_CONNECT_TIMEOUT_MS`

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wr_dispatch::{
    create_router, AppState, AuthConfig, Dispatcher, DispatcherConfig, HttpDeliverer,
    HttpDelivererConfig, LogCorrelator,
};
use wr_store::{DeliveryLogStore, EndpointRegistry, MemoryStore, PostgresStore};

/// Server configuration loaded from environment variables.
struct ServerConfig {
    host: String,
    port: u16,
    primary_base_url: String,
    api_key: Option<String>,
    database_url: Option<String>,
    dev_mode: bool,
    registry_timeout_ms: u64,
    retry_delay_ms: u64,
    connect_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    wr_common::logging::init_logging("wr-server");

    info!("Starting Webhook Relay server");

    let config = load_server_config()?;

    // 1. Store backend: PostgreSQL when configured, in-memory otherwise
    let (registry, log_store, store_backend): (
        Arc<dyn EndpointRegistry>,
        Arc<dyn DeliveryLogStore>,
        &'static str,
    ) = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = Arc::new(PostgresStore::new(pool));
            store.ensure_schema().await?;
            info!("Endpoint registry and delivery logs backed by PostgreSQL");
            (store.clone(), store, "postgres")
        }
        None => {
            warn!("DATABASE_URL not set - endpoints and delivery logs are held in memory only");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store, "memory")
        }
    };

    // 2. Prometheus recorder (rendered by GET /metrics)
    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder, /metrics will be empty");
            None
        }
    };

    // 3. Dispatch core
    let deliverer = Arc::new(HttpDeliverer::with_config(HttpDelivererConfig {
        inter_retry_delay: Duration::from_millis(config.retry_delay_ms),
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
    }));

    let mut dispatcher_config = DispatcherConfig::new(config.primary_base_url.clone());
    dispatcher_config.registry_timeout = Duration::from_millis(config.registry_timeout_ms);

    let dispatcher = Arc::new(Dispatcher::new(
        deliverer,
        registry.clone(),
        dispatcher_config,
    ));
    let correlator = Arc::new(LogCorrelator::new(log_store.clone()));

    // 4. HTTP API server
    let state = AppState {
        dispatcher,
        correlator,
        registry,
        log_store,
        auth: match &config.api_key {
            Some(key) => AuthConfig::bearer(key.clone()),
            None => AuthConfig::default(),
        },
        dev_mode: config.dev_mode,
        store_backend,
        metrics_handle,
        started_at: Instant::now(),
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    log_startup_summary(&config, store_backend);

    let addr = format!("{}:{}", config.host, config.port);
    info!(addr = %addr, "Starting HTTP server");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Webhook Relay shutdown complete");
    Ok(())
}

/// Load server configuration from environment variables.
fn load_server_config() -> Result<ServerConfig> {
    let primary_base_url = std::env::var("WR_PRIMARY_BASE_URL")
        .map_err(|_| anyhow::anyhow!("WR_PRIMARY_BASE_URL is required"))?;
    if primary_base_url.is_empty() {
        return Err(anyhow::anyhow!("WR_PRIMARY_BASE_URL cannot be empty"));
    }

    let host = std::env::var("WR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("WR_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let dev_mode = std::env::var("WR_DEV_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let registry_timeout_ms = env_u64("WR_REGISTRY_TIMEOUT_MS", 2_000);
    let retry_delay_ms = env_u64("WR_RETRY_DELAY_MS", 1_000);
    let connect_timeout_ms = env_u64("WR_CONNECT_TIMEOUT_MS", 10_000);

    Ok(ServerConfig {
        host,
        port,
        primary_base_url,
        api_key: std::env::var("WR_API_KEY").ok().filter(|k| !k.is_empty()),
        database_url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
        dev_mode,
        registry_timeout_ms,
        retry_delay_ms,
        connect_timeout_ms,
    })
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn log_startup_summary(config: &ServerConfig, store_backend: &str) {
    info!("=== Webhook Relay Startup Summary ===");
    info!("  Primary receiver: {}", config.primary_base_url);
    info!("  Store backend: {}", store_backend);
    if config.api_key.is_some() {
        info!("  Admin API: enabled (Bearer key)");
    } else {
        info!("  Admin API: DISABLED (no WR_API_KEY configured)");
    }
    if config.dev_mode {
        info!("  Dev mode: ON (acks carry error detail)");
    }
    info!("=====================================");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
