use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tplan_cache::SharedMarketDataCache;

use crate::config::RefresherConfig;
use crate::error::RefresherError;

/// The refresher daemon. Keeps the configured symbols fresh in the shared
/// cache and prunes rows past retention.
pub struct Daemon {
    config: RefresherConfig,
    cache: Arc<SharedMarketDataCache>,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(config: RefresherConfig, cache: Arc<SharedMarketDataCache>) -> Self {
        Self {
            config,
            cache,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &Arc<SharedMarketDataCache> {
        &self.cache
    }

    /// Run until cancelled.
    pub async fn run(&self) -> Result<(), RefresherError> {
        self.config.validate()?;
        tracing::info!(
            symbols = ?self.config.refresh.symbols,
            timeframes = ?self.cache.tracked_timeframes(),
            fetcher = self.cache.fetcher_name(),
            "Refresher daemon starting"
        );

        let mut join_set = JoinSet::new();

        {
            let cache = Arc::clone(&self.cache);
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                refresh_loop(cache, config, cancel).await;
            });
        }

        {
            let cache = Arc::clone(&self.cache);
            let interval = Duration::from_secs(self.config.refresh.cleanup_interval_seconds);
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                cleanup_loop(cache, interval, cancel).await;
            });
        }

        let outcome = join_loops(join_set, &self.cancel).await;
        tracing::info!("Refresher daemon stopped");
        outcome
    }
}

/// Wait for every loop to finish. A loop that panics cancels the others,
/// and its failure is returned once they have all stopped.
async fn join_loops(
    mut join_set: JoinSet<()>,
    cancel: &CancellationToken,
) -> Result<(), RefresherError> {
    let mut failure = None;
    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Refresher task panicked");
            cancel.cancel();
            failure.get_or_insert_with(|| RefresherError::Task(e.to_string()));
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn refresh_loop(
    cache: Arc<SharedMarketDataCache>,
    config: RefresherConfig,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs(config.refresh.interval_seconds);

    // Warm everything on startup
    tokio::select! {
        _ = cancel.cancelled() => return,
        results = cache.refresh_symbols_batch(&config.refresh.symbols) => {
            let failed: Vec<&String> = results.iter().filter(|(_, ok)| !**ok).map(|(s, _)| s).collect();
            if !failed.is_empty() {
                tracing::warn!(?failed, "Startup refresh incomplete");
            }
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Refresh loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                run_stale_pass(&cache, &config.refresh.symbols, config.refresh.max_age_seconds).await;
            }
        }
    }
}

/// One stale-check pass over `symbols`. Returns how many symbols had at
/// least one timeframe refetched.
pub async fn run_stale_pass(
    cache: &Arc<SharedMarketDataCache>,
    symbols: &[String],
    max_age_seconds: u64,
) -> usize {
    let mut join_set = JoinSet::new();
    for symbol in symbols {
        let cache = Arc::clone(cache);
        let symbol = symbol.clone();
        join_set.spawn(async move {
            let outcome = cache.check_and_refresh_stale(&symbol, max_age_seconds).await;
            (symbol, outcome)
        });
    }

    let mut refreshed = 0;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(true))) => refreshed += 1,
            Ok((_, Ok(false))) => {}
            Ok((symbol, Err(e))) => {
                tracing::warn!(symbol = %symbol, error = %e, "Stale refresh failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Stale refresh task panicked");
            }
        }
    }

    if refreshed > 0 {
        let hot_entries = cache.hot_cache_size().await;
        tracing::info!(refreshed, total = symbols.len(), hot_entries, "Stale pass complete");
    }
    refreshed
}

/// Periodically delete rows past retention.
async fn cleanup_loop(cache: Arc<SharedMarketDataCache>, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cleanup loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match cache.expire_stale() {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Cleaned up expired cache rows");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Expired row cleanup failed");
                    }
                }
            }
        }
    }
}
