use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tplan_models::{PlanRequest, Timeframe, TradePlan};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tplan", about = "Conditional trade plans over a shared indicator cache")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tplan.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a plan from PlanRequest JSON
    Create {
        /// Read the request from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Check one TradePlan (or a JSON array of them) against the cache
    Check {
        /// Read the plan(s) from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Refresh data older than this many seconds first
        #[arg(long)]
        max_age: Option<u64>,
    },
    /// Seconds since a symbol/timeframe was last refreshed
    CacheAge {
        #[arg(long)]
        symbol: String,

        #[arg(long, default_value = "M5")]
        timeframe: Timeframe,
    },
    /// Refresh the tracked timeframes of the given symbols
    Refresh {
        /// Comma-separated symbols
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,

        /// Refetch even fresh entries
        #[arg(long)]
        force: bool,
    },
    /// Cached entries for a symbol
    Status {
        #[arg(long)]
        symbol: String,
    },
}

#[derive(Serialize)]
struct CacheAgeOutput {
    symbol: String,
    timeframe: Timeframe,
    age_seconds: Option<f64>,
}

#[derive(Serialize)]
struct StatusRow {
    timeframe: Timeframe,
    age_seconds: f64,
    source: String,
    last_close: f64,
    structure: Option<tplan_models::StructureSignal>,
}

fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read input: {path}"))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = tplan::load_config(&cli.config)?;
    let service = Arc::new(tplan::build_service(&config).context("Failed to build plan service")?);
    let cache = Arc::clone(service.cache());

    match cli.command {
        Command::Create { input } => {
            let body = read_input(input.as_deref())?;
            let request: PlanRequest =
                serde_json::from_str(&body).context("Failed to parse PlanRequest JSON")?;
            let plan = service
                .create_plan(request)
                .map_err(|e| anyhow::anyhow!("Plan creation failed: {e}"))?;
            print_json(&plan, cli.pretty)?;
        }
        Command::Check { input, max_age } => {
            let max_age = max_age.unwrap_or(config.cache.default_max_age_seconds);
            let body = read_input(input.as_deref())?;
            let value: serde_json::Value =
                serde_json::from_str(&body).context("Failed to parse plan JSON")?;

            if value.is_array() {
                let plans: Vec<TradePlan> =
                    serde_json::from_value(value).context("Failed to parse TradePlan array")?;
                let mut checks = Vec::new();
                for (id, outcome) in service.check_plans(plans, max_age).await {
                    match outcome {
                        Ok(check) => checks.push(serde_json::to_value(check)?),
                        Err(e) => checks.push(serde_json::json!({
                            "plan_id": id,
                            "error": e.to_string(),
                        })),
                    }
                }
                print_json(&checks, cli.pretty)?;
            } else {
                let plan: TradePlan =
                    serde_json::from_value(value).context("Failed to parse TradePlan JSON")?;
                let check = service
                    .check_plan(&plan, max_age)
                    .await
                    .map_err(|e| anyhow::anyhow!("Plan check failed: {e}"))?;
                print_json(&check, cli.pretty)?;
            }
        }
        Command::CacheAge { symbol, timeframe } => {
            let age_seconds = cache.get_cache_age(&symbol, timeframe).await?;
            print_json(
                &CacheAgeOutput {
                    symbol,
                    timeframe,
                    age_seconds,
                },
                cli.pretty,
            )?;
        }
        Command::Refresh { symbols, force } => {
            let results: BTreeMap<String, bool> = if force {
                let mut results = BTreeMap::new();
                for symbol in symbols {
                    let ok = match cache.refresh_symbol(&symbol, true).await {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::warn!(symbol = %symbol, error = %e, "Forced refresh failed");
                            false
                        }
                    };
                    results.insert(symbol, ok);
                }
                results
            } else {
                cache.refresh_symbols_batch(&symbols).await.into_iter().collect()
            };
            print_json(&results, cli.pretty)?;
        }
        Command::Status { symbol } => {
            let now = Utc::now();
            let rows: Vec<StatusRow> = cache
                .entries_for_symbol(&symbol)?
                .into_iter()
                .map(|entry| StatusRow {
                    timeframe: entry.timeframe,
                    age_seconds: entry.age_seconds(now),
                    source: entry.source,
                    last_close: entry.value.last_close,
                    structure: entry.value.structure,
                })
                .collect();
            print_json(&rows, cli.pretty)?;
        }
    }

    Ok(())
}
