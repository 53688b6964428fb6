//! funnel-proxy entry point.
//!
//! Loads configuration, initializes tracing and the optional metrics
//! exporter, binds the listener and runs the server until shutdown.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use funnel_proxy::observability::metrics;
use funnel_proxy::{load_config, HttpServer, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "funnel-proxy", about = "Transforming reverse proxy for the witch-power funnel")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("funnel-proxy v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        main_origin = %config.upstreams.main_origin,
        secondary_origin = %config.upstreams.secondary_origin,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
