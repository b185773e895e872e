//! Market snapshot normalization and the deterministic evaluators.
//!
//! Everything here is a pure function of its inputs: no I/O, no clock reads
//! except in [`build_market_context`].

pub mod context;
pub mod pricing;
pub mod risk;
pub mod trend;

pub use context::{build_market_context, build_market_context_at, parse_timestamp};
pub use risk::{RiskConfig, RiskFlag};
pub use trend::TrendConfig;
