//! Shared types and error definitions for the market advisor.

pub mod agent;
pub mod error;
pub mod text;
pub mod types;

pub use agent::{AgentOutput, Recommendation, Verdict};
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
