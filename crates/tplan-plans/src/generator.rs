use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tplan_models::conditions::keys;
use tplan_models::{ConditionSet, Direction, PlanRequest, PlanType, PlansConfig};

fn price(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Trigger conditions implied by the request's plan type, before any
/// caller override is applied.
pub fn base_conditions(request: &PlanRequest, config: &PlansConfig) -> ConditionSet {
    let entry = price(request.entry);
    let timeframe = config.default_timeframe.to_string();
    let tolerance = config.tolerance_for(&request.symbol);

    match request.plan_type {
        PlanType::Choch => {
            let trigger = match request.direction {
                Direction::Buy => keys::CHOCH_BULL,
                Direction::Sell => keys::CHOCH_BEAR,
            };
            ConditionSet::new()
                .with(trigger, true)
                .with(keys::PRICE_NEAR, entry)
                .with(keys::TOLERANCE, tolerance)
                .with(keys::TIMEFRAME, timeframe)
        }
        PlanType::PriceLevel => ConditionSet::new()
            .with(keys::PRICE_NEAR, entry)
            .with(keys::TOLERANCE, tolerance)
            .with(keys::TIMEFRAME, timeframe),
        PlanType::Breakout => {
            let level = match request.direction {
                Direction::Buy => keys::PRICE_ABOVE,
                Direction::Sell => keys::PRICE_BELOW,
            };
            ConditionSet::new()
                .with(level, entry)
                .with(keys::TIMEFRAME, timeframe)
        }
    }
}
