use serde_json::Value;
use tplan_models::ConditionSet;

use crate::error::PlanError;

/// Merges caller-supplied conditions over generated ones.
///
/// Every override key is applied as given. Base keys the override does not
/// mention are kept. Primary trigger keys form a mutually exclusive group:
/// when the override turns one of them on (`true`), the base's other primary
/// triggers are dropped so the result never carries two opposing triggers.
#[derive(Debug, Clone)]
pub struct ConditionMerger {
    primary_trigger_keys: Vec<String>,
}

impl ConditionMerger {
    pub fn new(primary_trigger_keys: Vec<String>) -> Self {
        Self {
            primary_trigger_keys,
        }
    }

    pub fn primary_trigger_keys(&self) -> &[String] {
        &self.primary_trigger_keys
    }

    pub fn is_primary(&self, key: &str) -> bool {
        self.primary_trigger_keys.iter().any(|k| k == key)
    }

    /// Merge a raw JSON override. `None` and JSON `null` mean no override;
    /// any other non-object is a validation error.
    pub fn merge(
        &self,
        base: &ConditionSet,
        overrides: Option<&Value>,
    ) -> Result<ConditionSet, PlanError> {
        let overrides = match overrides {
            None | Some(Value::Null) => return Ok(base.clone()),
            Some(value) => ConditionSet::try_from(value.clone()).map_err(|kind| {
                PlanError::Validation(format!("conditions must be a JSON object, got {kind}"))
            })?,
        };
        Ok(self.merge_sets(base, overrides))
    }

    pub fn merge_sets(&self, base: &ConditionSet, overrides: ConditionSet) -> ConditionSet {
        let activates_primary = overrides
            .iter()
            .any(|(k, v)| self.is_primary(k) && v.as_bool() == Some(true));

        let mut merged: ConditionSet = base
            .iter()
            .filter(|(k, _)| !(activates_primary && self.is_primary(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in overrides {
            merged.insert(key, value);
        }
        merged
    }
}
