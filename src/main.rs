//! Main entry point for the telemetry/command hub daemon

use std::sync::Arc;
use tmtc_hub::{
    config::Settings,
    hub::{FanoutHub, HubConfig},
    server::HubServer,
    upstream::TcpUpstream,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));

    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting telemetry/command hub");
    info!(
        upstream = %settings.upstream.addr(),
        "Loaded configuration: server={}:{}",
        settings.server.host, settings.server.port
    );

    // Single upstream client, shared by the hub loop and the dispatcher
    let upstream = Arc::new(TcpUpstream::new(&settings.upstream));

    // Spawn the fan-out hub; it owns the feed and its reconnect loop
    let hub = FanoutHub::spawn(
        upstream.clone(),
        HubConfig {
            retry_interval: settings.upstream.retry_interval(),
            subscriber_buffer: settings.upstream.subscriber_buffer,
        },
    );

    // Start the consumer-facing dispatcher
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    HubServer::new(hub, upstream).serve(listener).await?;

    Ok(())
}
