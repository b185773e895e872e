//! Collaborator contracts the advisor consumes for market data.

use async_trait::async_trait;
use common::{Candle, CandleWindow, Error, RawMarket};

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch one market record. A missing market is `Error::MarketNotFound`.
    async fn fetch(&self, ticker: &str) -> Result<RawMarket, Error>;

    /// Markets whose title or ticker matches `query`. No match is `Ok(vec![])`.
    async fn search(&self, query: &str) -> Result<Vec<RawMarket>, Error>;
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles ascending by time. Closes may be missing.
    async fn fetch_candles(&self, ticker: &str, window: CandleWindow) -> Result<Vec<Candle>, Error>;
}
