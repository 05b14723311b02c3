use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conditions::ConditionSet;

pub const PLAN_SCHEMA_VERSION: u32 = 1;

/// Longest lifetime a plan may be given, in hours (ten years).
pub const MAX_EXPIRY_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Buy,
    Sell,
}

/// Which trigger family the plan is built around.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Change-of-character reversal near the entry price.
    Choch,
    /// Price returning to the entry level.
    PriceLevel,
    /// Price closing beyond the entry level.
    Breakout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Triggered,
    Expired,
    Cancelled,
}

/// Input to plan creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanRequest {
    pub symbol: String,
    pub direction: Direction,
    pub plan_type: PlanType,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub volume: Decimal,
    /// Hours until the plan expires. Falls back to the configured default.
    #[serde(default)]
    pub expires_hours: Option<u64>,
    /// Caller-supplied conditions merged over the generated ones. Must be a
    /// JSON object when present.
    #[serde(default)]
    pub conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A conditional trade plan waiting for its trigger conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradePlan {
    pub id: Uuid,
    pub schema_version: u32,
    pub symbol: String,
    pub direction: Direction,
    pub plan_type: PlanType,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub volume: Decimal,
    pub conditions: ConditionSet,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TradePlan {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
