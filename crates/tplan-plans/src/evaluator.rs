use serde::{Deserialize, Serialize};
use tplan_models::conditions::keys;
use tplan_models::{ConditionSet, IndicatorSnapshot, StructureSignal};

/// Outcome of checking a condition set against one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionCheck {
    /// True when no checked condition is unmet.
    pub met: bool,
    pub satisfied: Vec<String>,
    pub unmet: Vec<String>,
    /// Keys with no evaluation rule. Reported, never counted as unmet.
    pub unchecked: Vec<String>,
}

enum Verdict {
    Pass,
    Fail,
    Skip,
    Unknown,
}

fn verdict(ok: bool) -> Verdict {
    if ok {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

fn compare(actual: Option<f64>, threshold: Option<f64>, pass: impl Fn(f64, f64) -> bool) -> Verdict {
    match (actual, threshold) {
        (Some(a), Some(t)) => verdict(pass(a, t)),
        _ => Verdict::Fail,
    }
}

/// Check each condition against the snapshot.
///
/// `tolerance` and `timeframe` qualify other keys and are not reported on
/// their own. A primary trigger set to `false` is not a requirement.
pub fn evaluate(conditions: &ConditionSet, snapshot: &IndicatorSnapshot) -> ConditionCheck {
    let mut check = ConditionCheck::default();
    let close = Some(snapshot.last_close);

    for (key, value) in conditions.iter() {
        let threshold = value.as_f64();
        let outcome = match key.as_str() {
            keys::CHOCH_BULL | keys::CHOCH_BEAR => match value.as_bool() {
                Some(true) => {
                    let wanted = if key == keys::CHOCH_BULL {
                        StructureSignal::ChochBull
                    } else {
                        StructureSignal::ChochBear
                    };
                    verdict(snapshot.structure == Some(wanted))
                }
                _ => Verdict::Skip,
            },
            keys::PRICE_NEAR => {
                let tolerance = conditions.get_f64(keys::TOLERANCE).unwrap_or(0.0);
                compare(close, threshold, |c, p| (c - p).abs() <= tolerance)
            }
            keys::PRICE_ABOVE => compare(close, threshold, |c, p| c > p),
            keys::PRICE_BELOW => compare(close, threshold, |c, p| c < p),
            keys::MIN_VOLATILITY => compare(snapshot.volatility, threshold, |v, t| v >= t),
            keys::MAX_VOLATILITY => compare(snapshot.volatility, threshold, |v, t| v <= t),
            keys::RSI_ABOVE => compare(snapshot.rsi, threshold, |r, t| r > t),
            keys::RSI_BELOW => compare(snapshot.rsi, threshold, |r, t| r < t),
            keys::TOLERANCE | keys::TIMEFRAME => Verdict::Skip,
            _ => Verdict::Unknown,
        };

        match outcome {
            Verdict::Pass => check.satisfied.push(key.clone()),
            Verdict::Fail => check.unmet.push(key.clone()),
            Verdict::Unknown => check.unchecked.push(key.clone()),
            Verdict::Skip => {}
        }
    }

    check.met = check.unmet.is_empty();
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tplan_models::Timeframe;

    fn snapshot(last_close: f64, structure: Option<StructureSignal>) -> IndicatorSnapshot {
        let now = Utc::now();
        IndicatorSnapshot {
            symbol: "XAUUSD".to_string(),
            timeframe: Timeframe::M5,
            computed_at: now,
            bar_count: 100,
            last_bar_at: now,
            last_close,
            atr: Some(2.6),
            volatility: Some(0.6),
            rsi: Some(42.0),
            ema: Some(2651.0),
            cvd: -150.0,
            structure,
        }
    }

    fn conditions(value: serde_json::Value) -> ConditionSet {
        ConditionSet::try_from(value).unwrap()
    }

    #[test]
    fn choch_plan_met() {
        let set = conditions(json!({
            "choch_bull": true,
            "price_near": 2650.0,
            "tolerance": 5.0,
            "timeframe": "M5",
            "min_volatility": 0.5
        }));
        let check = evaluate(&set, &snapshot(2653.0, Some(StructureSignal::ChochBull)));

        assert!(check.met);
        assert_eq!(check.satisfied, vec!["choch_bull", "min_volatility", "price_near"]);
        assert!(check.unmet.is_empty());
        assert!(check.unchecked.is_empty());
    }

    #[test]
    fn wrong_structure_unmet() {
        let set = conditions(json!({"choch_bull": true}));
        let check = evaluate(&set, &snapshot(2653.0, Some(StructureSignal::ChochBear)));
        assert!(!check.met);
        assert_eq!(check.unmet, vec!["choch_bull"]);

        let check = evaluate(&set, &snapshot(2653.0, None));
        assert!(!check.met);
    }

    #[test]
    fn price_outside_tolerance_unmet() {
        let set = conditions(json!({"price_near": 2650.0, "tolerance": 2.0}));
        let check = evaluate(&set, &snapshot(2653.0, None));
        assert_eq!(check.unmet, vec!["price_near"]);
    }

    #[test]
    fn breakout_levels() {
        let above = conditions(json!({"price_above": 2650.0}));
        assert!(evaluate(&above, &snapshot(2650.5, None)).met);
        assert!(!evaluate(&above, &snapshot(2650.0, None)).met);

        let below = conditions(json!({"price_below": 2650.0}));
        assert!(evaluate(&below, &snapshot(2649.0, None)).met);
    }

    #[test]
    fn missing_indicator_is_unmet() {
        let mut snap = snapshot(2650.0, None);
        snap.rsi = None;
        let check = evaluate(&conditions(json!({"rsi_below": 50})), &snap);
        assert_eq!(check.unmet, vec!["rsi_below"]);
    }

    #[test]
    fn unknown_keys_reported_not_blocking() {
        let set = conditions(json!({"price_above": 2600.0, "cvd_div_bear": true}));
        let check = evaluate(&set, &snapshot(2650.0, None));
        assert!(check.met);
        assert_eq!(check.unchecked, vec!["cvd_div_bear"]);
    }

    #[test]
    fn disabled_trigger_skipped() {
        let set = conditions(json!({"choch_bear": false, "price_above": 2600.0}));
        let check = evaluate(&set, &snapshot(2650.0, None));
        assert!(check.met);
        assert_eq!(check.satisfied, vec!["price_above"]);
    }
}
