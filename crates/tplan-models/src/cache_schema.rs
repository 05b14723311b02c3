use chrono::{DateTime, SecondsFormat, Utc};

/// SQLite table shared by every process that reads or refreshes the cache
/// (the CLI and the refresher daemon).
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS indicator_cache (
///     key           TEXT PRIMARY KEY,
///     symbol        TEXT NOT NULL,
///     timeframe     TEXT NOT NULL,
///     value_json    TEXT NOT NULL,
///     source        TEXT NOT NULL,
///     refreshed_at  TEXT NOT NULL,
///     expires_at    TEXT NOT NULL
/// );
/// ```
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS indicator_cache (
    key           TEXT PRIMARY KEY,
    symbol        TEXT NOT NULL,
    timeframe     TEXT NOT NULL,
    value_json    TEXT NOT NULL,
    source        TEXT NOT NULL,
    refreshed_at  TEXT NOT NULL,
    expires_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_indicator_symbol ON indicator_cache(symbol);
CREATE INDEX IF NOT EXISTS idx_indicator_expires ON indicator_cache(expires_at);
";

/// Key conventions for cache entries.
///
/// - Indicator snapshots: `indicator:{symbol}:{timeframe}` (e.g., `indicator:XAUUSD:M5`)
pub mod key_patterns {
    use crate::market::Timeframe;

    pub fn indicator(symbol: &str, timeframe: Timeframe) -> String {
        format!("indicator:{symbol}:{timeframe}")
    }
}

/// Fixed-width RFC 3339 (`2025-01-13T14:30:00.000Z`) so stored timestamps
/// compare correctly as text.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Inverse of [`format_timestamp`]; accepts any RFC 3339 offset.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// A raw cache row as stored in SQLite. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub key: String,
    pub symbol: String,
    pub timeframe: String,
    pub value_json: String,
    pub source: String,
    pub refreshed_at: String,
    /// Retention limit: after this the row is treated as absent and may be
    /// deleted. Staleness is judged from `refreshed_at`, not from this.
    pub expires_at: String,
}
