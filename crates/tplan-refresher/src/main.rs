use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tplan_cache::SharedMarketDataCache;
use tplan_refresher::{Daemon, RefresherConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tplan-refresher",
    about = "Keeps the shared indicator cache fresh for the configured symbols"
)]
struct Cli {
    /// Path to refresher configuration file
    #[arg(short, long, default_value = "config/tplan-refresher.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: RefresherConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse refresher config")?;

    let cache = SharedMarketDataCache::open(config.cache.clone())
        .with_context(|| format!("Failed to open cache DB: {}", config.cache.sqlite_path))?;

    let daemon = Daemon::new(config, Arc::new(cache));
    let cancel = daemon.cancel_token();

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    daemon
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Daemon error: {e}"))?;

    Ok(())
}
