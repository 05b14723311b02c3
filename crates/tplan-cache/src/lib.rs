pub mod candles;
pub mod error;
pub mod fetcher;
pub mod indicators;
pub mod memory;
pub mod shared;
pub mod sqlite;

pub use candles::CandleStore;
pub use error::CacheError;
pub use fetcher::{CandleFileFetcher, IndicatorFetcher};
pub use shared::SharedMarketDataCache;
pub use sqlite::SqliteStore;
