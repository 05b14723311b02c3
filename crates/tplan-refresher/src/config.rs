use serde::{Deserialize, Serialize};
use tplan_models::CacheConfig;

use crate::error::RefresherError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefresherConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshConfig {
    /// Symbols kept warm in the shared cache.
    pub symbols: Vec<String>,
    /// Seconds between stale checks.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Entries older than this are refetched on each pass.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    /// Seconds between expired-row cleanup runs.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl RefresherConfig {
    pub fn validate(&self) -> Result<(), RefresherError> {
        if self.refresh.symbols.is_empty() {
            return Err(RefresherError::Config(
                "refresh.symbols must list at least one symbol".to_string(),
            ));
        }
        if self.refresh.interval_seconds == 0 || self.refresh.cleanup_interval_seconds == 0 {
            return Err(RefresherError::Config(
                "refresh intervals must be positive".to_string(),
            ));
        }
        self.cache.validate().map_err(RefresherError::Config)
    }
}

fn default_interval() -> u64 {
    60
}
fn default_max_age() -> u64 {
    180
}
fn default_cleanup_interval() -> u64 {
    300
}
