use anyhow::{bail, Context, Result};
use sensor_gateway::influx::InfluxClient;
use sensor_gateway::{metrics, rest, Config, SensorGateway};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    info!("Starting sensor gateway");
    info!(
        "InfluxDB: {} (org: {}, bucket: {})",
        config.influx.url, config.influx.org, config.influx.bucket
    );

    metrics::init_metrics().context("failed to register metrics")?;

    let client = InfluxClient::new(&config.influx).context("failed to build InfluxDB client")?;
    let gateway = SensorGateway::new(
        Arc::new(client),
        config.influx.bucket.clone(),
        config.timeouts,
    );

    // Refuse to start against a store that is unreachable or not ready
    let health = gateway
        .ping(config.timeouts.startup)
        .await
        .context("failed to connect to InfluxDB")?;
    if !health.is_pass() {
        bail!("InfluxDB health check failed: {}", health.status);
    }
    info!("Successfully connected to InfluxDB");

    let app = rest::create_router(gateway);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
