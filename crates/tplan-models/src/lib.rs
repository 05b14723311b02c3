pub mod cache_schema;
pub mod conditions;
pub mod config;
pub mod indicator;
pub mod market;
pub mod plan;

pub use cache_schema::CacheRow;
pub use conditions::ConditionSet;
pub use config::{CacheConfig, PlansConfig, TplanConfig};
pub use indicator::{CachedIndicatorEntry, IndicatorSnapshot, StructureSignal};
pub use market::{Candle, ParseTimeframeError, Timeframe};
pub use plan::{Direction, PlanRequest, MAX_EXPIRY_HOURS, PlanStatus, PlanType, TradePlan};
