//! Recommendation engine for binary prediction-market contracts.
//!
//! [`Advisor`] runs the full pipeline for one market record; the binary wires it
//! to the Kalshi, NewsAPI and Anthropic clients.

pub mod advisor;
pub mod config;
pub mod journal;

pub use advisor::Advisor;
pub use config::AppConfig;
pub use journal::RecommendationJournal;
