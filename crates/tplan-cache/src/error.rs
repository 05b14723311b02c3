use thiserror::Error;
use tplan_models::Timeframe;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data exists but does not have the shape the consumer expects.
    #[error("Schema mismatch in {source_name}: {detail}")]
    SchemaMismatch { source_name: String, detail: String },

    #[error("No data for {symbol} {timeframe}")]
    NoData { symbol: String, timeframe: Timeframe },

    #[error("Fetch failed for {symbol} {timeframe}: {reason}")]
    Fetch {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error("Fetch for {symbol} {timeframe} timed out after {seconds} seconds")]
    Timeout {
        symbol: String,
        timeframe: Timeframe,
        seconds: u64,
    },

    #[error("Cache not available: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn schema_mismatch(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }
}
