use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conditions::keys;
use crate::market::Timeframe;
use crate::plan::MAX_EXPIRY_HOURS;

/// Top-level configuration for the `tplan` CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TplanConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub plans: PlansConfig,
}

impl TplanConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;
        self.plans.validate()
    }
}

/// Configuration for the shared market-data cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Path to the shared SQLite cache file.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    #[serde(default = "default_memory_max_capacity")]
    pub memory_max_capacity: u64,
    /// How long a read stays in memory before it is re-read from SQLite.
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
    /// Age after which an entry counts as stale for non-forced refreshes.
    #[serde(default = "default_max_age")]
    pub default_max_age_seconds: u64,
    /// Timeout for a single fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// How long a row is kept in SQLite after its last refresh.
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,
    /// Root directory of the candle files read by the default fetcher
    /// (`{candles_path}/{SYMBOL}/{TIMEFRAME}.csv`).
    #[serde(default = "default_candles_path")]
    pub candles_path: String,
    /// Number of most recent bars used for indicator computation.
    #[serde(default = "default_lookback_bars")]
    pub lookback_bars: usize,
    /// Timeframes refreshed by `refresh_symbol` and the stale check.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            memory_max_capacity: default_memory_max_capacity(),
            memory_ttl_seconds: default_memory_ttl(),
            default_max_age_seconds: default_max_age(),
            fetch_timeout_seconds: default_fetch_timeout(),
            retention_seconds: default_retention(),
            candles_path: default_candles_path(),
            lookback_bars: default_lookback_bars(),
            timeframes: default_timeframes(),
        }
    }
}

/// Configuration for plan creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlansConfig {
    /// Timeframe written into generated conditions.
    #[serde(default = "default_plan_timeframe")]
    pub default_timeframe: Timeframe,
    /// `price_near` tolerance for symbols without an entry in `tolerances`.
    #[serde(default = "default_tolerance")]
    pub default_tolerance: f64,
    /// Per-symbol `price_near` tolerance, in price units.
    #[serde(default)]
    pub tolerances: BTreeMap<String, f64>,
    #[serde(default = "default_expiry_hours")]
    pub default_expiry_hours: u64,
    /// Mutually exclusive trigger keys. An override that sets one of them
    /// replaces whichever the generated conditions carried.
    #[serde(default = "default_primary_trigger_keys")]
    pub primary_trigger_keys: Vec<String>,
}

impl CacheConfig {
    /// Checks the values a running cache cannot recover from.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeframes.is_empty() {
            return Err("cache.timeframes must not be empty".to_string());
        }
        if self.fetch_timeout_seconds == 0 {
            return Err("cache.fetch_timeout_seconds must be positive".to_string());
        }
        let retention = i64::try_from(self.retention_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds);
        if self.retention_seconds == 0 || retention.is_none() {
            return Err(format!(
                "cache.retention_seconds must be between 1 and {}, got {}",
                i64::MAX / 1000,
                self.retention_seconds
            ));
        }
        Ok(())
    }
}

impl PlansConfig {
    /// Tolerances must be positive and finite, and the default expiry must
    /// fall within `1..=MAX_EXPIRY_HOURS`.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.default_tolerance.is_finite() && self.default_tolerance > 0.0) {
            return Err(format!(
                "plans.default_tolerance must be positive, got {}",
                self.default_tolerance
            ));
        }
        for (symbol, tolerance) in &self.tolerances {
            if !(tolerance.is_finite() && *tolerance > 0.0) {
                return Err(format!(
                    "plans.tolerances.{symbol} must be positive, got {tolerance}"
                ));
            }
        }
        if !(1..=MAX_EXPIRY_HOURS).contains(&self.default_expiry_hours) {
            return Err(format!(
                "plans.default_expiry_hours must be between 1 and {MAX_EXPIRY_HOURS}, got {}",
                self.default_expiry_hours
            ));
        }
        Ok(())
    }

    pub fn tolerance_for(&self, symbol: &str) -> f64 {
        self.tolerances
            .get(symbol)
            .copied()
            .unwrap_or(self.default_tolerance)
    }
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            default_timeframe: default_plan_timeframe(),
            default_tolerance: default_tolerance(),
            tolerances: BTreeMap::new(),
            default_expiry_hours: default_expiry_hours(),
            primary_trigger_keys: default_primary_trigger_keys(),
        }
    }
}

fn default_sqlite_path() -> String {
    "data/tplan_cache.db".to_string()
}
fn default_memory_max_capacity() -> u64 {
    10_000
}
fn default_memory_ttl() -> u64 {
    60
}
fn default_max_age() -> u64 {
    180
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_retention() -> u64 {
    86_400
}
fn default_candles_path() -> String {
    "data/candles".to_string()
}
fn default_lookback_bars() -> usize {
    200
}
fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M1, Timeframe::M5, Timeframe::M15]
}
fn default_plan_timeframe() -> Timeframe {
    Timeframe::M5
}
fn default_tolerance() -> f64 {
    1.0
}
fn default_expiry_hours() -> u64 {
    24
}
fn default_primary_trigger_keys() -> Vec<String> {
    vec![keys::CHOCH_BULL.to_string(), keys::CHOCH_BEAR.to_string()]
}
