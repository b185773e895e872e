//! Unified error type for the data-source collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Kalshi API error (status={status}): {message}")]
    KalshiApi { status: u16, message: String },

    #[error("NewsAPI error (status={status}): {message}")]
    NewsApi { status: u16, message: String },

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("Invalid agent output: {0}")]
    InvalidAgentOutput(String),

    #[error("{0}")]
    Other(String),
}
