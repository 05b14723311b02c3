//! Test support: a scripted fetcher and snapshot builders.
//!
//! `StaticFetcher` serves whatever snapshot was last scripted for a
//! symbol/timeframe, so tests can move the market between checks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tplan_cache::{CacheError, IndicatorFetcher, SharedMarketDataCache, SqliteStore};
use tplan_models::{CacheConfig, IndicatorSnapshot, StructureSignal, Timeframe};

#[derive(Default)]
pub struct StaticFetcher {
    snapshots: Mutex<HashMap<(String, Timeframe), IndicatorSnapshot>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the snapshot returned for its symbol/timeframe.
    pub fn set(&self, snapshot: IndicatorSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert((snapshot.symbol.clone(), snapshot.timeframe), snapshot);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndicatorFetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        snapshots
            .get(&(symbol.to_string(), timeframe))
            .map(|s| {
                let mut s = s.clone();
                s.computed_at = Utc::now();
                s
            })
            .ok_or_else(|| CacheError::NoData {
                symbol: symbol.to_string(),
                timeframe,
            })
    }
}

/// A plain snapshot: no structure signal, 0.6% volatility, RSI 50.
pub fn snapshot(symbol: &str, timeframe: Timeframe, last_close: f64) -> IndicatorSnapshot {
    let now = Utc::now();
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timeframe,
        computed_at: now,
        bar_count: 200,
        last_bar_at: now,
        last_close,
        atr: Some(last_close * 0.006),
        volatility: Some(0.6),
        rsi: Some(50.0),
        ema: Some(last_close),
        cvd: 0.0,
        structure: None,
    }
}

pub fn with_structure(mut snapshot: IndicatorSnapshot, signal: StructureSignal) -> IndicatorSnapshot {
    snapshot.structure = Some(signal);
    snapshot
}

/// In-memory SQLite cache backed by `fetcher`.
pub fn memory_cache(fetcher: Arc<StaticFetcher>, timeframes: Vec<Timeframe>) -> Arc<SharedMarketDataCache> {
    let config = CacheConfig {
        timeframes,
        ..CacheConfig::default()
    };
    let store = SqliteStore::open_in_memory().expect("in-memory SQLite");
    Arc::new(SharedMarketDataCache::new(
        config,
        store,
        Some(fetcher as Arc<dyn IndicatorFetcher>),
    ))
}
