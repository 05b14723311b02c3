//! tplan - conditional trade plans over a shared indicator cache
//!
//! Plans are created from a request plus optional caller conditions, and
//! checked against per-symbol/per-timeframe indicator snapshots that a
//! refresher daemon keeps fresh in SQLite.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tplan::models::{PlanRequest, TradePlan, TplanConfig};
//! use tplan::plans::{ConditionMerger, PlanService};
//! use tplan::cache::SharedMarketDataCache;
//! ```

pub use tplan_cache as cache;
pub use tplan_models as models;
pub use tplan_plans as plans;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tplan_cache::SharedMarketDataCache;
use tplan_models::TplanConfig;
use tplan_plans::PlanService;

/// Read and validate a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<TplanConfig, anyhow::Error> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: TplanConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))?;
    Ok(config)
}

/// Open the shared cache and build a plan service from configuration.
pub fn build_service(config: &TplanConfig) -> Result<PlanService, anyhow::Error> {
    config.validate().map_err(|e| anyhow!("Invalid config: {e}"))?;
    let cache = SharedMarketDataCache::open(config.cache.clone())
        .with_context(|| format!("Failed to open cache DB: {}", config.cache.sqlite_path))?;
    Ok(PlanService::new(Arc::new(cache), config.plans.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_config_reads_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cache]
sqlite_path = "/tmp/tplan.db"
timeframes = ["M5"]

[plans]
default_timeframe = "M15"

[plans.tolerances]
XAUUSD = 5.0
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.cache.sqlite_path, "/tmp/tplan.db");
        assert_eq!(config.plans.tolerance_for("XAUUSD"), 5.0);
        assert_eq!(config.plans.default_timeframe.as_str(), "M15");
    }

    #[test]
    fn load_config_rejects_zero_tolerance() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[plans.tolerances]\nXAUUSD = 0.0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid config"), "{message}");
        assert!(message.contains("plans.tolerances.XAUUSD"), "{message}");
    }

    #[test]
    fn build_service_rejects_invalid_config() {
        let mut config = TplanConfig::default();
        config.plans.default_expiry_hours = 0;
        let err = build_service(&config).err().expect("expected build_service to fail");
        assert!(err.to_string().contains("default_expiry_hours"));
    }

    #[test]
    fn load_config_missing_file_errors() {
        let err = load_config("/nonexistent/tplan.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn build_service_opens_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TplanConfig::default();
        config.cache.sqlite_path = dir.path().join("cache.db").to_string_lossy().into_owned();

        let service = build_service(&config).unwrap();
        assert_eq!(service.cache().fetcher_name(), "candle-files");
        assert!(dir.path().join("cache.db").exists());
    }
}
