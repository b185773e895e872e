//! Kalshi market data client.
//!
//! Read-only access to the public Kalshi trade API: single market lookup,
//! title search with cursor pagination, and candlestick history.

pub mod rate_limit;
pub mod rest;
pub mod source;

pub use rate_limit::RateLimiter;
pub use rest::{KalshiClientConfig, KalshiRestClient};
pub use source::{CandleSource, MarketDataSource};
