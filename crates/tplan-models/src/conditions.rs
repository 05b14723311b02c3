use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known condition keys. Any other string is accepted as a free-form
/// enhancement key and carried through untouched.
pub mod keys {
    pub const CHOCH_BULL: &str = "choch_bull";
    pub const CHOCH_BEAR: &str = "choch_bear";
    pub const PRICE_NEAR: &str = "price_near";
    pub const PRICE_ABOVE: &str = "price_above";
    pub const PRICE_BELOW: &str = "price_below";
    pub const TOLERANCE: &str = "tolerance";
    pub const TIMEFRAME: &str = "timeframe";
    pub const MIN_VOLATILITY: &str = "min_volatility";
    pub const MAX_VOLATILITY: &str = "max_volatility";
    pub const RSI_ABOVE: &str = "rsi_above";
    pub const RSI_BELOW: &str = "rsi_below";
}

/// Trigger conditions of a trade plan: condition name -> JSON value.
///
/// Ordered by key so serialized plans are stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConditionSet(BTreeMap<String, Value>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

impl IntoIterator for ConditionSet {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Value)> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Name of the JSON kind, used when rejecting a non-object.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Only JSON objects convert. The error names the rejected kind.
impl TryFrom<Value> for ConditionSet {
    type Error = &'static str;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(json_kind(&other)),
        }
    }
}
