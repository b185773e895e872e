//! Domain types shared across the advisor crates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A raw market record exactly as the market data source returned it.
pub type RawMarket = serde_json::Map<String, serde_json::Value>;

// ── Verdict vocabulary ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    NoTrade,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::NoTrade => "NO_TRADE",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Market snapshot ───────────────────────────────────────────────────

/// Canonical snapshot of one market, derived once per evaluation.
///
/// Prices are probabilities in [0,1]; anything that could not be derived is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub ticker: Option<String>,
    pub event_ticker: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub status: Option<String>,
    pub market_type: Option<String>,

    pub rules_primary: Option<String>,
    pub rules_secondary: Option<String>,
    pub yes_label: Option<String>,
    pub no_label: Option<String>,
    pub strike_type: Option<String>,
    pub custom_strike: Option<serde_json::Value>,

    pub yes_ask: Option<f64>,
    pub yes_bid: Option<f64>,
    pub no_ask: Option<f64>,
    pub no_bid: Option<f64>,
    pub last_price: Option<f64>,

    pub yes_spread: Option<f64>,
    pub no_spread: Option<f64>,

    pub volume: Option<i64>,
    pub volume_24h: Option<i64>,
    pub open_interest: Option<i64>,
    pub liquidity_dollars: Option<f64>,

    pub close_time: Option<String>,
    pub updated_time: Option<String>,
    /// Hours from the evaluation instant to close; negative once closed.
    pub time_to_close_h: Option<f64>,
    /// Seconds since `updated_time` at the evaluation instant.
    pub quote_age_s: Option<f64>,
}

impl MarketContext {
    /// Ticker with surrounding whitespace removed; empty when absent.
    pub fn ticker_str(&self) -> &str {
        self.ticker.as_deref().map(str::trim).unwrap_or("")
    }

    /// Title with surrounding whitespace removed; empty when absent.
    pub fn title_str(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("")
    }
}

// ── Candles ───────────────────────────────────────────────────────────

/// One OHLC candle. Prices are probabilities; any of them may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub end_ts: i64,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub open_interest: i64,
}

/// How much candle history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleWindow {
    /// Candle width in minutes (Kalshi accepts 1, 60 or 1440).
    pub period_minutes: u32,
    /// How far back from now to fetch.
    pub lookback_hours: u32,
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self {
            period_minutes: 60,
            lookback_hours: 24 * 7,
        }
    }
}
