use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::market::Timeframe;

/// Market-structure event detected on the most recent bars.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StructureSignal {
    /// Bearish structure broken to the upside.
    ChochBull,
    /// Bullish structure broken to the downside.
    ChochBear,
}

/// Indicator data computed from recent bars of one symbol/timeframe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub computed_at: DateTime<Utc>,
    pub bar_count: usize,
    pub last_bar_at: DateTime<Utc>,
    pub last_close: f64,
    /// ATR(14). None with fewer than 15 bars.
    pub atr: Option<f64>,
    /// ATR as a percentage of the last close.
    pub volatility: Option<f64>,
    /// RSI(14).
    pub rsi: Option<f64>,
    /// EMA(20) of closes.
    pub ema: Option<f64>,
    /// Cumulative volume delta over the loaded bars.
    pub cvd: f64,
    pub structure: Option<StructureSignal>,
}

impl IndicatorSnapshot {
    /// Name of the first NaN or infinite numeric field, if any. JSON has no
    /// encoding for those values.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        let fields = [
            ("last_close", Some(self.last_close)),
            ("atr", self.atr),
            ("volatility", self.volatility),
            ("rsi", self.rsi),
            ("ema", self.ema),
            ("cvd", Some(self.cvd)),
        ];
        fields
            .into_iter()
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
            .map(|(name, _)| name)
    }
}

/// A cache entry for one symbol/timeframe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedIndicatorEntry {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub value: IndicatorSnapshot,
    pub refreshed_at: DateTime<Utc>,
    /// Name of the fetcher (or external producer) that computed the value.
    pub source: String,
}

impl CachedIndicatorEntry {
    pub fn new(value: IndicatorSnapshot, source: impl Into<String>) -> Self {
        Self {
            symbol: value.symbol.clone(),
            timeframe: value.timeframe,
            refreshed_at: Utc::now(),
            value,
            source: source.into(),
        }
    }

    /// Seconds since the last refresh. Never negative.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.refreshed_at).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Stale once the age strictly exceeds `max_age_seconds`.
    pub fn is_stale(&self, max_age_seconds: u64, now: DateTime<Utc>) -> bool {
        self.age_seconds(now) > max_age_seconds as f64
    }
}
