use std::path::PathBuf;

use tplan_models::{Candle, Timeframe};

use crate::error::CacheError;

/// Bar files on disk, one CSV per symbol and timeframe:
/// `{root}/{SYMBOL}/{TIMEFRAME}.csv` with header
/// `timestamp,open,high,low,close,volume` (RFC 3339 timestamps).
///
/// Files are written by whatever feeds bars into the system; the default
/// fetcher only reads them.
pub struct CandleStore {
    root: PathBuf,
}

impl CandleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.root.join(symbol).join(format!("{timeframe}.csv"))
    }

    /// Read the most recent `limit` bars, oldest first.
    ///
    /// A missing file is `NoData`; a file whose rows do not parse as bars,
    /// or carry NaN/infinite prices or volume, is a `SchemaMismatch` naming
    /// the file and row.
    pub fn read_recent(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, CacheError> {
        let path = self.path(symbol, timeframe);
        if !path.exists() {
            return Err(CacheError::NoData {
                symbol: symbol.to_string(),
                timeframe,
            });
        }

        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| CacheError::schema_mismatch(path.display().to_string(), e.to_string()))?;

        let mut candles = Vec::new();
        for (index, record) in reader.deserialize::<Candle>().enumerate() {
            let candle = record.map_err(|e| {
                CacheError::schema_mismatch(
                    path.display().to_string(),
                    format!("row {}: {e}", index + 1),
                )
            })?;
            let values = [candle.open, candle.high, candle.low, candle.close, candle.volume];
            if !values.iter().all(|v| v.is_finite()) {
                return Err(CacheError::schema_mismatch(
                    path.display().to_string(),
                    format!("row {}: non-finite OHLCV value", index + 1),
                ));
            }
            candles.push(candle);
        }

        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    /// Replace the bar file for a symbol/timeframe.
    pub fn write(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), CacheError> {
        let path = self.path(symbol, timeframe);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| CacheError::Unavailable(format!("{}: {e}", path.display())))?;
        for candle in candles {
            writer
                .serialize(candle)
                .map_err(|e| CacheError::Unavailable(format!("{}: {e}", path.display())))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 13, 14, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64;
                Candle {
                    timestamp: start + Duration::minutes(i as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.5,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn write_then_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        store.write("XAUUSD", Timeframe::M1, &bars(10)).unwrap();

        let recent = store.read_recent("XAUUSD", Timeframe::M1, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].open, 107.0);
        assert_eq!(recent[2].open, 109.0);
    }

    #[test]
    fn unordered_rows_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        let mut candles = bars(5);
        candles.reverse();
        store.write("XAUUSD", Timeframe::M5, &candles).unwrap();

        let recent = store.read_recent("XAUUSD", Timeframe::M5, 10).unwrap();
        assert_eq!(recent.len(), 5);
        assert!(recent.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        let err = store.read_recent("NOPE", Timeframe::M1, 10).unwrap_err();
        assert!(matches!(err, CacheError::NoData { .. }));
    }

    #[test]
    fn malformed_file_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        let path = store.path("XAUUSD", Timeframe::M1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "time,price\n2025-01-13T14:00:00Z,100.0\n").unwrap();

        let err = store.read_recent("XAUUSD", Timeframe::M1, 10).unwrap_err();
        match err {
            CacheError::SchemaMismatch { detail, .. } => assert!(detail.contains("row 1")),
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_values_are_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CandleStore::new(dir.path());
        let path = store.path("XAUUSD", Timeframe::M1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n\
             2025-01-13T14:00:00Z,100.0,101.0,99.0,100.5,1000.0\n\
             2025-01-13T14:01:00Z,100.5,101.5,99.5,NaN,1000.0\n",
        )
        .unwrap();

        let err = store.read_recent("XAUUSD", Timeframe::M1, 10).unwrap_err();
        match err {
            CacheError::SchemaMismatch { detail, .. } => {
                assert!(detail.contains("row 2"), "detail was {detail}")
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }

        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n\
             2025-01-13T14:00:00Z,100.0,101.0,99.0,100.5,inf\n",
        )
        .unwrap();
        let err = store.read_recent("XAUUSD", Timeframe::M1, 10).unwrap_err();
        assert!(matches!(err, CacheError::SchemaMismatch { .. }));
    }
}
