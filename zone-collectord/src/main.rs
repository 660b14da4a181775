mod collector;
mod config;
mod error;
mod reconcile;
mod rules;
mod store;
mod zone;

use std::path::PathBuf;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::collector::Collector;
use crate::config::{Config, Overrides};
use crate::zone::AxfrClient;

/// Keeps Prometheus file_sd documents in sync with a DNS zone.
#[derive(Parser, Debug)]
#[command(name = "zone-collectord")]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Authoritative nameserver, host or host:port
    #[arg(short, long)]
    nameserver: Option<String>,

    /// Zone to transfer, may be repeated
    #[arg(short, long = "domain")]
    domains: Vec<String>,

    /// Directory the service-discovery files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Seconds before a zone transfer is abandoned
    #[arg(long)]
    transfer_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zone_collectord=info"))
        )
        .init();

    tracing::info!("Starting zone-collectord");

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => Config::default(),
    };
    config.apply(Overrides {
        nameserver: args.nameserver,
        domains: args.domains,
        output_dir: args.output_dir,
        interval_secs: args.interval,
        transfer_timeout_secs: args.transfer_timeout,
    });

    let rules = config.validate().context("Invalid configuration")?;
    let (host, port) = config.nameserver_addr()?;
    let domains = config.domains();

    tracing::info!(
        nameserver = %config.collector.nameserver,
        domains = ?domains,
        output_dir = %config.collector.output_dir.display(),
        interval_secs = config.collector.interval_secs,
        rules = rules.len(),
        "Collector configured"
    );

    let source = AxfrClient::new(host, port, config.transfer_timeout());
    let span = tracing::info_span!("collector", nameserver = %config.collector.nameserver);
    let worker = Collector::new(source, rules, config.collector.output_dir.clone(), span);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let loop_cancel = cancel.clone();
    let interval = config.interval();
    let loop_handle = tokio::spawn(async move {
        if let Err(e) = collector::run(worker, domains, interval, loop_cancel).await {
            tracing::error!("Collector error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Let the running cycle finish
    cancel.cancel();
    let _ = loop_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
