use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tplan_cache::SharedMarketDataCache;
use tplan_models::conditions::keys;
use tplan_models::plan::PLAN_SCHEMA_VERSION;
use tplan_models::{PlanRequest, PlanStatus, PlansConfig, Timeframe, TradePlan};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::PlanError;
use crate::evaluator::{evaluate, ConditionCheck};
use crate::generator::base_conditions;
use crate::merger::ConditionMerger;
use crate::validate::{validate_conditions, validate_request};

/// Result of checking one plan against current market data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanCheck {
    pub plan_id: Uuid,
    /// Status the plan should move to. `Triggered` when all conditions are met.
    pub status: PlanStatus,
    pub timeframe: Timeframe,
    pub cache_age_seconds: Option<f64>,
    pub last_close: Option<f64>,
    /// `None` when the plan was not evaluated (expired or no longer pending).
    pub conditions: Option<ConditionCheck>,
}

/// Creates plans and checks them against the shared cache.
pub struct PlanService {
    cache: Arc<SharedMarketDataCache>,
    merger: ConditionMerger,
    config: PlansConfig,
}

impl PlanService {
    pub fn new(cache: Arc<SharedMarketDataCache>, config: PlansConfig) -> Self {
        Self {
            merger: ConditionMerger::new(config.primary_trigger_keys.clone()),
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<SharedMarketDataCache> {
        &self.cache
    }

    pub fn merger(&self) -> &ConditionMerger {
        &self.merger
    }

    /// Build a pending plan: generated conditions for the plan type, with
    /// the request's `conditions` merged on top.
    pub fn create_plan(&self, request: PlanRequest) -> Result<TradePlan, PlanError> {
        validate_request(&request)?;

        let base = base_conditions(&request, &self.config);
        let conditions = self.merger.merge(&base, request.conditions.as_ref())?;
        validate_conditions(&conditions, self.merger.primary_trigger_keys())?;

        let hours = request
            .expires_hours
            .unwrap_or(self.config.default_expiry_hours);
        let created_at = Utc::now();
        let expires_at = i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|lifetime| created_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                PlanError::Validation(format!("expiry of {hours} hours is out of range"))
            })?;
        let plan = TradePlan {
            id: Uuid::new_v4(),
            schema_version: PLAN_SCHEMA_VERSION,
            symbol: request.symbol,
            direction: request.direction,
            plan_type: request.plan_type,
            entry: request.entry,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            volume: request.volume,
            conditions,
            status: PlanStatus::Pending,
            created_at,
            expires_at,
            notes: request.notes,
        };

        info!(
            id = %plan.id,
            symbol = %plan.symbol,
            plan_type = ?plan.plan_type,
            conditions = plan.conditions.len(),
            "Plan created"
        );
        Ok(plan)
    }

    /// `create_plan` for a raw JSON request body.
    pub fn create_plan_json(&self, body: &str) -> Result<TradePlan, PlanError> {
        let request: PlanRequest = serde_json::from_str(body)?;
        self.create_plan(request)
    }

    /// Timeframe the plan is evaluated on.
    pub fn plan_timeframe(&self, plan: &TradePlan) -> Timeframe {
        plan.conditions
            .get_str(keys::TIMEFRAME)
            .and_then(|tf| tf.parse().ok())
            .unwrap_or(self.config.default_timeframe)
    }

    /// Refresh the plan's timeframe if older than `max_age_seconds`, then
    /// evaluate its conditions. Refresh failures are returned rather than
    /// evaluating stale data.
    pub async fn check_plan(
        &self,
        plan: &TradePlan,
        max_age_seconds: u64,
    ) -> Result<PlanCheck, PlanError> {
        let timeframe = self.plan_timeframe(plan);
        let now = Utc::now();

        let status = match plan.status {
            PlanStatus::Pending if plan.is_expired(now) => Some(PlanStatus::Expired),
            PlanStatus::Pending => None,
            other => Some(other),
        };
        if let Some(status) = status {
            return Ok(PlanCheck {
                plan_id: plan.id,
                status,
                timeframe,
                cache_age_seconds: None,
                last_close: None,
                conditions: None,
            });
        }

        self.cache
            .refresh_if_stale(&plan.symbol, timeframe, max_age_seconds)
            .await?;
        let entry = self.cache.get(&plan.symbol, timeframe).await?;
        let check = evaluate(&plan.conditions, &entry.value);

        let status = if check.met {
            PlanStatus::Triggered
        } else {
            PlanStatus::Pending
        };
        info!(
            id = %plan.id,
            symbol = %plan.symbol,
            %timeframe,
            met = check.met,
            unmet = ?check.unmet,
            "Plan checked"
        );

        Ok(PlanCheck {
            plan_id: plan.id,
            status,
            timeframe,
            cache_age_seconds: Some(entry.age_seconds(Utc::now())),
            last_close: Some(entry.value.last_close),
            conditions: Some(check),
        })
    }

    /// Check many plans concurrently. Results keep input order; a failed
    /// plan does not stop the others.
    pub async fn check_plans(
        self: &Arc<Self>,
        plans: Vec<TradePlan>,
        max_age_seconds: u64,
    ) -> Vec<(Uuid, Result<PlanCheck, PlanError>)> {
        let mut handles = Vec::new();
        for plan in plans {
            let service = Arc::clone(self);
            handles.push((
                plan.id,
                tokio::spawn(async move { service.check_plan(&plan, max_age_seconds).await }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    if let Err(e) = &outcome {
                        warn!(id = %id, error = %e, "Plan check failed");
                    }
                    results.push((id, outcome));
                }
                Err(e) => {
                    error!(id = %id, error = %e, "Plan check task panicked");
                    results.push((id, Err(PlanError::Task(e.to_string()))));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_cache, snapshot, with_structure, StaticFetcher};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tplan_models::{Direction, PlanType, StructureSignal};

    fn request(conditions: Option<serde_json::Value>) -> PlanRequest {
        PlanRequest {
            symbol: "XAUUSD".to_string(),
            direction: Direction::Sell,
            plan_type: PlanType::Choch,
            entry: dec!(2650),
            stop_loss: dec!(2660),
            take_profit: dec!(2630),
            volume: dec!(0.01),
            expires_hours: None,
            conditions,
            notes: None,
        }
    }

    fn service(fetcher: Arc<StaticFetcher>) -> PlanService {
        let mut config = PlansConfig::default();
        config.tolerances.insert("XAUUSD".to_string(), 5.0);
        PlanService::new(memory_cache(fetcher, vec![Timeframe::M5]), config)
    }

    #[test]
    fn create_merges_enhancements() {
        let service = service(Arc::new(StaticFetcher::new()));
        let plan = service
            .create_plan(request(Some(json!({"min_volatility": 0.5}))))
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.schema_version, PLAN_SCHEMA_VERSION);
        assert_eq!(plan.conditions.get_bool("choch_bear"), Some(true));
        assert_eq!(plan.conditions.get_f64("min_volatility"), Some(0.5));
        assert_eq!(plan.conditions.get_f64("price_near"), Some(2650.0));
        assert_eq!(plan.expires_at - plan.created_at, Duration::hours(24));
    }

    #[test]
    fn create_rejects_invalid_override() {
        let service = service(Arc::new(StaticFetcher::new()));
        let err = service
            .create_plan(request(Some(json!({"timeframe": "weekly"}))))
            .unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));

        let err = service
            .create_plan(request(Some(json!(["choch_bull"]))))
            .unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
    }

    #[test]
    fn create_from_json_body() {
        let service = service(Arc::new(StaticFetcher::new()));
        let body = r#"{
            "symbol": "XAUUSD",
            "direction": "buy",
            "plan_type": "breakout",
            "entry": "2650",
            "stop_loss": "2640",
            "take_profit": "2680",
            "volume": "0.02",
            "conditions": {"rsi_above": 55}
        }"#;
        let plan = service.create_plan_json(body).unwrap();
        assert_eq!(plan.conditions.get_f64("price_above"), Some(2650.0));
        assert_eq!(plan.conditions.get_f64("rsi_above"), Some(55.0));

        let err = service.create_plan_json("{\"symbol\": 1}").unwrap_err();
        assert!(matches!(err, PlanError::Json(_)));
    }

    #[test]
    fn create_honors_expiry() {
        let service = service(Arc::new(StaticFetcher::new()));
        let mut req = request(None);
        req.expires_hours = Some(4);
        let plan = service.create_plan(req).unwrap();
        assert_eq!(plan.expires_at - plan.created_at, Duration::hours(4));
    }

    #[test]
    fn create_rejects_out_of_range_expiry() {
        let service = service(Arc::new(StaticFetcher::new()));
        for hours in ["4000000000", "18446744073709551615"] {
            let body = format!(
                r#"{{
                    "symbol": "XAUUSD",
                    "direction": "sell",
                    "plan_type": "choch",
                    "entry": "2650",
                    "stop_loss": "2660",
                    "take_profit": "2630",
                    "volume": "0.01",
                    "expires_hours": {hours}
                }}"#
            );
            let err = service.create_plan_json(&body).unwrap_err();
            assert!(matches!(err, PlanError::Validation(_)), "{hours}: {err:?}");
        }
    }

    #[test]
    fn create_with_unchecked_default_expiry_errors() {
        let mut config = PlansConfig::default();
        config.default_expiry_hours = u64::MAX;
        let service = PlanService::new(
            memory_cache(Arc::new(StaticFetcher::new()), vec![Timeframe::M5]),
            config,
        );

        let err = service.create_plan(request(None)).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
    }

    #[tokio::test]
    async fn check_triggers_when_met() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set(with_structure(
            snapshot("XAUUSD", Timeframe::M5, 2652.0),
            StructureSignal::ChochBear,
        ));
        let service = service(fetcher.clone());
        let plan = service.create_plan(request(None)).unwrap();

        let check = service.check_plan(&plan, 180).await.unwrap();
        assert_eq!(check.status, PlanStatus::Triggered);
        assert_eq!(check.timeframe, Timeframe::M5);
        assert_eq!(check.last_close, Some(2652.0));
        assert!(check.conditions.unwrap().met);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn check_stays_pending_when_unmet() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set(snapshot("XAUUSD", Timeframe::M5, 2652.0));
        let service = service(fetcher);
        let plan = service.create_plan(request(None)).unwrap();

        let check = service.check_plan(&plan, 180).await.unwrap();
        assert_eq!(check.status, PlanStatus::Pending);
        assert_eq!(check.conditions.unwrap().unmet, vec!["choch_bear"]);
    }

    #[tokio::test]
    async fn check_uses_condition_timeframe() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set(snapshot("XAUUSD", Timeframe::H1, 2652.0));
        let service = service(fetcher);
        let plan = service
            .create_plan(request(Some(json!({"timeframe": "H1", "choch_bear": false}))))
            .unwrap();

        let check = service.check_plan(&plan, 180).await.unwrap();
        assert_eq!(check.timeframe, Timeframe::H1);
        assert_eq!(check.status, PlanStatus::Triggered);
    }

    #[tokio::test]
    async fn expired_plan_not_evaluated() {
        let fetcher = Arc::new(StaticFetcher::new());
        let service = service(fetcher.clone());
        let mut plan = service.create_plan(request(None)).unwrap();
        plan.expires_at = Utc::now() - Duration::minutes(1);

        let check = service.check_plan(&plan, 180).await.unwrap();
        assert_eq!(check.status, PlanStatus::Expired);
        assert!(check.conditions.is_none());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn check_without_data_fails() {
        let service = service(Arc::new(StaticFetcher::new()));
        let plan = service.create_plan(request(None)).unwrap();

        let err = service.check_plan(&plan, 180).await.unwrap_err();
        assert!(matches!(err, PlanError::Cache(_)));
    }

    #[tokio::test]
    async fn check_plans_keeps_order_and_isolates_failures() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.set(snapshot("XAUUSD", Timeframe::M5, 2652.0));
        let service = Arc::new(service(fetcher));

        let good = service.create_plan(request(None)).unwrap();
        let mut other = request(None);
        other.symbol = "BTCUSD".to_string();
        other.entry = dec!(97000);
        other.stop_loss = dec!(97500);
        other.take_profit = dec!(96000);
        let bad = service.create_plan(other).unwrap();

        let results = service
            .check_plans(vec![good.clone(), bad.clone()], 180)
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, good.id);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, bad.id);
        assert!(results[1].1.is_err());
    }
}
