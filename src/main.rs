//! request-shield demo server.
//!
//! Serves a small echo application behind the full security stack:
//!
//! ```text
//! client ─▶ request id ─▶ trace ─▶ timeout ─▶ rate limit ─▶ cookies ─▶ session ─▶ csrf ─▶ handler
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_shield::config::{load_config, ShieldConfig};
use request_shield::observability::{logging, metrics};
use request_shield::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "request-shield", version, about = "HTTP request security demo server")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("request-shield v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        config_path = ?args.config,
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        csrf_enabled = config.csrf.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.app_key == ShieldConfig::default().app_key {
        tracing::warn!("Running with the placeholder app_key; set a secret key in production");
    }

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

    HttpServer::new(config).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
