pub mod error;
pub mod evaluator;
pub mod generator;
pub mod merger;
pub mod service;
pub mod validate;

pub mod test_support;

pub use error::PlanError;
pub use evaluator::{evaluate, ConditionCheck};
pub use generator::base_conditions;
pub use merger::ConditionMerger;
pub use service::{PlanCheck, PlanService};
pub use validate::{validate_conditions, validate_request};
