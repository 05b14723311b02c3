use std::sync::Arc;

use async_trait::async_trait;
use tplan_models::{IndicatorSnapshot, Timeframe};

use crate::candles::CandleStore;
use crate::error::CacheError;
use crate::indicators::compute_snapshot;

/// Source of fresh indicator data for the shared cache. Mockable for testing.
#[async_trait]
pub trait IndicatorFetcher: Send + Sync {
    /// Recorded as the `source` of every entry this fetcher produces.
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, CacheError>;
}

/// Default fetcher: reads recent bars from the candle files and computes
/// indicators locally.
pub struct CandleFileFetcher {
    store: Arc<CandleStore>,
    lookback_bars: usize,
}

impl CandleFileFetcher {
    pub fn new(store: CandleStore, lookback_bars: usize) -> Self {
        Self {
            store: Arc::new(store),
            lookback_bars,
        }
    }
}

#[async_trait]
impl IndicatorFetcher for CandleFileFetcher {
    fn name(&self) -> &str {
        "candle-files"
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSnapshot, CacheError> {
        let store = Arc::clone(&self.store);
        let owned_symbol = symbol.to_string();
        let lookback = self.lookback_bars;

        let candles = tokio::task::spawn_blocking(move || {
            store.read_recent(&owned_symbol, timeframe, lookback)
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("candle reader task failed: {e}")))??;

        compute_snapshot(symbol, timeframe, &candles).ok_or_else(|| CacheError::NoData {
            symbol: symbol.to_string(),
            timeframe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tplan_models::Candle;

    fn bars(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 13, 14, 0, 0).unwrap();
        (0..count)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: 2650.0,
                high: 2651.0,
                low: 2649.0,
                close: 2650.5,
                volume: 5.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn fetch_computes_from_recent_bars() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        store.write("XAUUSD", Timeframe::M1, &bars(50)).unwrap();

        let fetcher = CandleFileFetcher::new(store, 20);
        let snapshot = fetcher.fetch("XAUUSD", Timeframe::M1).await.unwrap();

        assert_eq!(snapshot.symbol, "XAUUSD");
        assert_eq!(snapshot.timeframe, Timeframe::M1);
        assert_eq!(snapshot.bar_count, 20);
        assert_eq!(snapshot.last_close, 2650.5);
        assert_eq!(snapshot.cvd, 100.0);
    }

    #[tokio::test]
    async fn empty_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        store.write("XAUUSD", Timeframe::M5, &[]).unwrap();

        let fetcher = CandleFileFetcher::new(store, 20);
        let err = fetcher.fetch("XAUUSD", Timeframe::M5).await.unwrap_err();
        assert!(matches!(err, CacheError::NoData { .. }));
    }
}
