use rust_decimal::Decimal;
use serde_json::Value;
use tplan_models::conditions::{json_kind, keys};
use tplan_models::{ConditionSet, Direction, PlanRequest, Timeframe, MAX_EXPIRY_HOURS};

use crate::error::PlanError;

const PRICE_KEYS: [&str; 3] = [keys::PRICE_NEAR, keys::PRICE_ABOVE, keys::PRICE_BELOW];
const VOLATILITY_KEYS: [&str; 2] = [keys::MIN_VOLATILITY, keys::MAX_VOLATILITY];
const RSI_KEYS: [&str; 2] = [keys::RSI_ABOVE, keys::RSI_BELOW];

fn invalid(key: &str, expected: &str, value: &Value) -> PlanError {
    PlanError::Validation(format!(
        "{key} must be {expected}, got {} {value}",
        json_kind(value)
    ))
}

fn number(key: &str, value: &Value) -> Result<f64, PlanError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(key, "a finite number", value))
}

/// Type-check the well-known keys of a merged condition set. Unknown keys
/// are free-form and pass through.
pub fn validate_conditions(
    conditions: &ConditionSet,
    primary_trigger_keys: &[String],
) -> Result<(), PlanError> {
    let mut active_triggers = Vec::new();

    for (key, value) in conditions.iter() {
        let key = key.as_str();
        if primary_trigger_keys.iter().any(|k| k == key) {
            match value.as_bool() {
                Some(true) => active_triggers.push(key),
                Some(false) => {}
                None => return Err(invalid(key, "a boolean", value)),
            }
        } else if PRICE_KEYS.contains(&key) || VOLATILITY_KEYS.contains(&key) {
            if number(key, value)? < 0.0 {
                return Err(invalid(key, "non-negative", value));
            }
        } else if key == keys::TOLERANCE {
            if number(key, value)? <= 0.0 {
                return Err(invalid(key, "positive", value));
            }
        } else if RSI_KEYS.contains(&key) {
            if !(0.0..=100.0).contains(&number(key, value)?) {
                return Err(invalid(key, "between 0 and 100", value));
            }
        } else if key == keys::TIMEFRAME {
            let parsed = value.as_str().map(str::parse::<Timeframe>);
            if !matches!(parsed, Some(Ok(_))) {
                return Err(invalid(key, "a timeframe like \"M5\"", value));
            }
        }
    }

    if active_triggers.len() > 1 {
        return Err(PlanError::Validation(format!(
            "conflicting primary triggers: {}",
            active_triggers.join(", ")
        )));
    }

    if conditions.contains_key(keys::PRICE_NEAR) && !conditions.contains_key(keys::TOLERANCE) {
        return Err(PlanError::Validation(
            "price_near requires a tolerance".to_string(),
        ));
    }

    if let (Some(min), Some(max)) = (
        conditions.get_f64(keys::MIN_VOLATILITY),
        conditions.get_f64(keys::MAX_VOLATILITY),
    ) {
        if min > max {
            return Err(PlanError::Validation(format!(
                "min_volatility {min} exceeds max_volatility {max}"
            )));
        }
    }

    Ok(())
}

/// Reject requests whose prices cannot form a valid bracket.
pub fn validate_request(request: &PlanRequest) -> Result<(), PlanError> {
    if request.symbol.trim().is_empty() {
        return Err(PlanError::Validation("symbol is empty".to_string()));
    }

    let positive = [
        ("entry", request.entry),
        ("stop_loss", request.stop_loss),
        ("take_profit", request.take_profit),
        ("volume", request.volume),
    ];
    for (name, value) in positive {
        if value <= Decimal::ZERO {
            return Err(PlanError::Validation(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }

    let (sl, entry, tp) = (request.stop_loss, request.entry, request.take_profit);
    let ordered = match request.direction {
        Direction::Buy => sl < entry && entry < tp,
        Direction::Sell => tp < entry && entry < sl,
    };
    if !ordered {
        return Err(PlanError::Validation(format!(
            "{:?} plan needs stop_loss and take_profit on opposite sides of entry \
             (entry={entry}, stop_loss={sl}, take_profit={tp})",
            request.direction
        )));
    }

    if let Some(hours) = request.expires_hours {
        if !(1..=MAX_EXPIRY_HOURS).contains(&hours) {
            return Err(PlanError::Validation(format!(
                "expires_hours must be between 1 and {MAX_EXPIRY_HOURS}, got {hours}"
            )));
        }
    }

    Ok(())
}
