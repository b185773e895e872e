//! Evaluators that consult the reasoning service: rules clarity and news evidence.
//!
//! Each makes a single bounded call per evaluation and always returns an
//! [`AgentOutput`](common::AgentOutput); unusable replies map to safe defaults.

pub mod news;
pub mod rules;

pub use news::{NewsEvidenceConfig, NewsEvidenceEvaluator, QueryMode};
pub use rules::{RulesConfig, RulesEvaluator};
