//! Attribution proxy binary.

use std::path::PathBuf;

use clap::Parser;

use attribution_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
#[cfg(unix)]
use attribution_proxy::lifecycle::limits;
use attribution_proxy::lifecycle::{wait_for_signal, Shutdown};
use attribution_proxy::net::Listener;
use attribution_proxy::observability::{logging, metrics};
use attribution_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "attribution-proxy")]
#[command(about = "HTTP/HTTPS forward proxy that logs which local process sent each request", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides listener.bind_address
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level, overrides observability.log_level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listener.bind_address = listen;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("attribution-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        attribution = config.attribution.enabled,
        proc_root = %config.attribution.proc_root,
        "Configuration loaded"
    );

    #[cfg(unix)]
    match limits::raise_open_file_limit() {
        Ok(limit) => tracing::info!(
            previous = limit.previous,
            current = limit.current,
            "Open file limit"
        ),
        Err(e) => tracing::info!(error = %e, "Cannot raise open file limit"),
    }

    if config.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
