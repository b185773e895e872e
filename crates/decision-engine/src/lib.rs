//! Final aggregation of evaluator outputs into one recommendation.

pub mod engine;
pub mod payload;
pub mod types;

pub use engine::{deterministic_fallback, hard_veto, validate_verdict, Aggregator};
pub use payload::{MarketSnapshot, PromptPayload};
pub use types::{AggregateVerdict, AggregatorConfig};
