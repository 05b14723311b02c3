use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tplan_models::cache_schema::{format_timestamp, key_patterns, parse_timestamp, CacheRow};
use tplan_models::{CacheConfig, CachedIndicatorEntry, IndicatorSnapshot, Timeframe};
use tracing::{debug, error, info, warn};

use crate::candles::CandleStore;
use crate::error::CacheError;
use crate::fetcher::{CandleFileFetcher, IndicatorFetcher};
use crate::memory::MemoryCache;
use crate::sqlite::SqliteStore;

/// When a refresh of one symbol/timeframe actually calls the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshPolicy {
    Always,
    IfMissing,
    IfOlderThan(u64),
}

/// Per-symbol/per-timeframe cache of computed indicator data.
///
/// Lookups go moka (hot) → SQLite (shared) → fetcher. Every refresh is
/// written to both tiers. Refreshes of the same key are serialized by an
/// async lock; a non-forced refresh re-checks freshness after taking the
/// lock so concurrent callers trigger a single fetch.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SharedMarketDataCache {
    memory: MemoryCache,
    store: Mutex<SqliteStore>,
    fetcher: Arc<dyn IndicatorFetcher>,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: CacheConfig,
}

impl SharedMarketDataCache {
    /// Open the SQLite file from config and use the default candle-file fetcher.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let store = SqliteStore::open(&config.sqlite_path)?;
        Ok(Self::new(config, store, None))
    }

    /// Build a cache over `store`. `fetcher` replaces the default
    /// candle-file fetcher when given.
    pub fn new(
        config: CacheConfig,
        store: SqliteStore,
        fetcher: Option<Arc<dyn IndicatorFetcher>>,
    ) -> Self {
        let fetcher = fetcher.unwrap_or_else(|| {
            Arc::new(CandleFileFetcher::new(
                CandleStore::new(&config.candles_path),
                config.lookback_bars,
            ))
        });
        info!(
            fetcher = fetcher.name(),
            timeframes = ?config.timeframes,
            "Shared market data cache ready"
        );

        Self {
            memory: MemoryCache::new(
                config.memory_max_capacity,
                Duration::from_secs(config.memory_ttl_seconds),
            ),
            store: Mutex::new(store),
            fetcher,
            refresh_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// Timeframes covered by `refresh_symbol` and `check_and_refresh_stale`.
    pub fn tracked_timeframes(&self) -> &[Timeframe] {
        &self.config.timeframes
    }

    /// Cached entry for `symbol`/`timeframe`, stale or not. Fetches
    /// synchronously when nothing is cached.
    pub async fn get(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<CachedIndicatorEntry, CacheError> {
        if let Some(entry) = self.lookup(symbol, timeframe).await? {
            return Ok(entry);
        }

        debug!(symbol, %timeframe, "Cache miss, fetching");
        self.refresh_one(symbol, timeframe, RefreshPolicy::IfMissing)
            .await?;

        self.lookup(symbol, timeframe).await?.ok_or_else(|| {
            CacheError::Unavailable(format!("{symbol} {timeframe} missing after refresh"))
        })
    }

    /// Seconds since the last refresh, or None when not cached.
    pub async fn get_cache_age(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<f64>, CacheError> {
        let now = Utc::now();
        Ok(self
            .lookup(symbol, timeframe)
            .await?
            .map(|entry| entry.age_seconds(now)))
    }

    /// Refresh every tracked timeframe of `symbol`. Without `force`, only
    /// timeframes that are missing or older than `default_max_age_seconds`
    /// are fetched.
    ///
    /// Returns whether anything was fetched. All timeframes are attempted;
    /// the first failure is returned afterwards.
    pub async fn refresh_symbol(&self, symbol: &str, force: bool) -> Result<bool, CacheError> {
        let policy = if force {
            RefreshPolicy::Always
        } else {
            RefreshPolicy::IfOlderThan(self.config.default_max_age_seconds)
        };
        self.refresh_tracked(symbol, policy).await
    }

    /// Refresh many symbols concurrently (non-forced). Every input symbol
    /// gets an entry in the result; `false` means its refresh failed.
    pub async fn refresh_symbols_batch(self: &Arc<Self>, symbols: &[String]) -> HashMap<String, bool> {
        let mut results: HashMap<String, bool> =
            symbols.iter().map(|s| (s.clone(), false)).collect();

        let mut join_set = JoinSet::new();
        for symbol in results.keys() {
            let cache = Arc::clone(self);
            let symbol = symbol.clone();
            join_set.spawn(async move {
                let outcome = cache.refresh_symbol(&symbol, false).await;
                (symbol, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((symbol, Ok(_))) => {
                    results.insert(symbol, true);
                }
                Ok((symbol, Err(e))) => {
                    warn!(symbol = %symbol, error = %e, "Batch refresh failed for symbol");
                }
                Err(e) => {
                    error!(error = %e, "Batch refresh task panicked");
                }
            }
        }

        let succeeded = results.values().filter(|ok| **ok).count();
        info!(total = results.len(), succeeded, "Batch refresh complete");
        results
    }

    /// Refresh tracked timeframes of `symbol` whose age exceeds
    /// `max_age_seconds` (or that are not cached). `Ok(false)` when
    /// everything was fresh.
    pub async fn check_and_refresh_stale(
        &self,
        symbol: &str,
        max_age_seconds: u64,
    ) -> Result<bool, CacheError> {
        self.refresh_tracked(symbol, RefreshPolicy::IfOlderThan(max_age_seconds))
            .await
    }

    /// Single-timeframe form of `check_and_refresh_stale`, for timeframes
    /// outside the tracked set.
    pub async fn refresh_if_stale(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        max_age_seconds: u64,
    ) -> Result<bool, CacheError> {
        self.refresh_one(symbol, timeframe, RefreshPolicy::IfOlderThan(max_age_seconds))
            .await
    }

    /// Store an entry computed elsewhere, replacing any cached value.
    pub async fn put(&self, entry: CachedIndicatorEntry) -> Result<(), CacheError> {
        if entry.symbol != entry.value.symbol || entry.timeframe != entry.value.timeframe {
            return Err(CacheError::schema_mismatch(
                "put",
                format!(
                    "entry key {} {} does not match value {} {}",
                    entry.symbol, entry.timeframe, entry.value.symbol, entry.value.timeframe
                ),
            ));
        }
        self.write_entry(entry).await
    }

    /// Drop an entry from both tiers.
    pub async fn invalidate(&self, symbol: &str, timeframe: Timeframe) -> Result<(), CacheError> {
        let key = key_patterns::indicator(symbol, timeframe);
        {
            let store = self.lock_store()?;
            store.delete(&key)?;
        }
        self.memory.invalidate(&key).await;
        Ok(())
    }

    /// All live SQLite entries for `symbol`, ordered by key.
    pub fn entries_for_symbol(&self, symbol: &str) -> Result<Vec<CachedIndicatorEntry>, CacheError> {
        let rows = {
            let store = self.lock_store()?;
            store.get_by_symbol(symbol)?
        };
        rows.into_iter().map(row_to_entry).collect()
    }

    /// Delete SQLite rows past retention.
    pub fn expire_stale(&self) -> Result<usize, CacheError> {
        let store = self.lock_store()?;
        store.expire_stale()
    }

    /// Number of entries in the hot moka tier.
    pub async fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count().await
    }

    async fn refresh_tracked(&self, symbol: &str, policy: RefreshPolicy) -> Result<bool, CacheError> {
        let mut refreshed = false;
        let mut first_error = None;

        for &timeframe in &self.config.timeframes {
            match self.refresh_one(symbol, timeframe, policy).await {
                Ok(fetched) => refreshed |= fetched,
                Err(e) => {
                    warn!(symbol, %timeframe, error = %e, "Refresh failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(refreshed),
        }
    }

    /// Refresh one key according to `policy`. Returns whether the fetcher ran.
    async fn refresh_one(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        policy: RefreshPolicy,
    ) -> Result<bool, CacheError> {
        let key = key_patterns::indicator(symbol, timeframe);
        let lock = self.refresh_lock(&key)?;
        let _guard = lock.lock().await;

        if policy != RefreshPolicy::Always {
            match self.lookup(symbol, timeframe).await {
                Ok(Some(entry)) => {
                    let fresh = match policy {
                        RefreshPolicy::IfOlderThan(max_age) => {
                            !entry.is_stale(max_age, Utc::now())
                        }
                        _ => true,
                    };
                    if fresh {
                        debug!(symbol, %timeframe, "Entry fresh, skipping refresh");
                        return Ok(false);
                    }
                }
                Ok(None) => {}
                // An undecodable row counts as missing; the fetch below overwrites it.
                Err(e @ CacheError::SchemaMismatch { .. }) => {
                    warn!(symbol, %timeframe, error = %e, "Cached entry unreadable, refetching");
                }
                Err(e) => return Err(e),
            }
        }

        let snapshot = self.fetch(symbol, timeframe).await?;
        let entry = CachedIndicatorEntry::new(snapshot, self.fetcher.name());
        self.write_entry(entry).await?;
        debug!(symbol, %timeframe, "Refreshed cache entry");
        Ok(true)
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, CacheError> {
        let seconds = self.config.fetch_timeout_seconds;
        let snapshot = tokio::time::timeout(
            Duration::from_secs(seconds),
            self.fetcher.fetch(symbol, timeframe),
        )
        .await
        .map_err(|_| CacheError::Timeout {
            symbol: symbol.to_string(),
            timeframe,
            seconds,
        })??;

        if snapshot.symbol != symbol || snapshot.timeframe != timeframe {
            return Err(CacheError::schema_mismatch(
                self.fetcher.name(),
                format!(
                    "requested {symbol} {timeframe}, got {} {}",
                    snapshot.symbol, snapshot.timeframe
                ),
            ));
        }
        Ok(snapshot)
    }

    /// moka first, then SQLite. SQLite hits are promoted to moka.
    async fn lookup(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<CachedIndicatorEntry>, CacheError> {
        let key = key_patterns::indicator(symbol, timeframe);
        if let Some(entry) = self.memory.get(&key).await {
            return Ok(Some(entry));
        }

        let row = {
            let store = self.lock_store()?;
            store.get(&key)?
        };

        match row {
            Some(row) => {
                let entry = row_to_entry(row)?;
                self.memory.insert(key, entry.clone()).await;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn write_entry(&self, entry: CachedIndicatorEntry) -> Result<(), CacheError> {
        if let Some(field) = entry.value.non_finite_field() {
            return Err(CacheError::schema_mismatch(
                &entry.source,
                format!(
                    "{} {}: {field} is not a finite number",
                    entry.symbol, entry.timeframe
                ),
            ));
        }
        let row = entry_to_row(&entry, self.config.retention_seconds)?;
        {
            let store = self.lock_store()?;
            store.upsert(&row)?;
        }
        self.memory.insert(row.key, entry).await;
        Ok(())
    }

    fn refresh_lock(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>, CacheError> {
        let mut locks = self
            .refresh_locks
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("refresh lock map poisoned: {e}")))?;
        Ok(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, SqliteStore>, CacheError> {
        self.store
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

fn entry_to_row(entry: &CachedIndicatorEntry, retention_seconds: u64) -> Result<CacheRow, CacheError> {
    let expires_at = i64::try_from(retention_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|retention| entry.refreshed_at.checked_add_signed(retention))
        .ok_or_else(|| {
            CacheError::Unavailable(format!("retention of {retention_seconds}s is out of range"))
        })?;
    Ok(CacheRow {
        key: key_patterns::indicator(&entry.symbol, entry.timeframe),
        symbol: entry.symbol.clone(),
        timeframe: entry.timeframe.to_string(),
        value_json: serde_json::to_string(&entry.value)?,
        source: entry.source.clone(),
        refreshed_at: format_timestamp(entry.refreshed_at),
        expires_at: format_timestamp(expires_at),
    })
}

/// Decode a stored row. Any shape problem is a `SchemaMismatch` naming the key.
fn row_to_entry(row: CacheRow) -> Result<CachedIndicatorEntry, CacheError> {
    let timeframe: Timeframe = row
        .timeframe
        .parse()
        .map_err(|e| CacheError::schema_mismatch(&row.key, format!("{e}")))?;
    let refreshed_at = parse_timestamp(&row.refreshed_at).ok_or_else(|| {
        CacheError::schema_mismatch(&row.key, format!("bad refreshed_at: {}", row.refreshed_at))
    })?;
    let value: IndicatorSnapshot = serde_json::from_str(&row.value_json)
        .map_err(|e| CacheError::schema_mismatch(&row.key, format!("value_json: {e}")))?;

    Ok(CachedIndicatorEntry {
        symbol: row.symbol,
        timeframe,
        value,
        refreshed_at,
        source: row.source,
    })
}
