use anyhow::{Context, Result};
use gallery_service::api::{start_api_server, AppState};
use gallery_service::config::Config;
use gallery_service::photo_store::PhotoStore;
use gallery_service::s3_storage::S3Storage;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting gallery service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components once; both are shared read-only across requests
    let store = Arc::new(
        PhotoStore::new(&config.database)
            .await
            .context("Failed to initialize photo store")?,
    );

    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let storage = Arc::new(
        S3Storage::new(&config.s3)
            .await
            .context("Failed to initialize S3 storage")?,
    );

    let state = AppState {
        store,
        storage,
        presigned_url_expiry: config.presigned_url_expiry(),
    };

    start_api_server(state, &config.api).await?;

    info!("Gallery service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}
