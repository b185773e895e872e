//! REST client for the public Kalshi market data endpoints.
//!
//! Covers: single market lookup, paginated title search, candlesticks.
//! All methods are rate-limited; none require authentication.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{Candle, CandleWindow, Error, RawMarket};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::rate_limit::RateLimiter;
use crate::source::{CandleSource, MarketDataSource};

const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co";
const PROD_BASE_URL: &str = "https://api.elections.kalshi.com";
const API_PREFIX: &str = "/trade-api/v2";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_rest_base_url(config: &KalshiClientConfig) -> String {
    if let Ok(override_url) = std::env::var("KALSHI_API_BASE_URL") {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using KALSHI_API_BASE_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty KALSHI_API_BASE_URL override");
    }

    let configured = normalize_base_url(&config.api_base);
    if !configured.is_empty() {
        return configured;
    }

    if config.use_demo {
        DEMO_BASE_URL.to_string()
    } else {
        PROD_BASE_URL.to_string()
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        format!("{}…", compact.chars().take(MAX_CHARS).collect::<String>())
    } else {
        compact
    }
}

/// Connection and paging settings for [`KalshiRestClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KalshiClientConfig {
    pub use_demo: bool,
    /// Overrides the demo/prod choice when non-empty.
    pub api_base: String,
    pub timeout_ms: u64,
    pub reads_per_sec: u32,
    /// Markets per page when searching.
    pub page_limit: u32,
    pub max_pages: u32,
    pub max_results: usize,
    /// Status filter applied server-side during search; empty means any.
    pub search_status: String,
}

impl Default for KalshiClientConfig {
    fn default() -> Self {
        Self {
            use_demo: false,
            api_base: String::new(),
            timeout_ms: 10_000,
            reads_per_sec: 20,
            page_limit: 200,
            max_pages: 100,
            max_results: 100,
            search_status: "open".into(),
        }
    }
}

#[derive(Deserialize)]
struct MarketsPage {
    #[serde(default)]
    markets: Vec<RawMarket>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Async REST client for Kalshi market data.
#[derive(Debug, Clone)]
pub struct KalshiRestClient {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    config: KalshiClientConfig,
}

impl KalshiRestClient {
    pub fn new(config: KalshiClientConfig) -> Result<Self, Error> {
        let base_url = resolve_rest_base_url(&config);
        match reqwest::Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(Error::Config(format!(
                    "Kalshi base URL must be http(s), got scheme '{}'",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "invalid Kalshi base URL '{}': {}",
                    base_url, e
                )))
            }
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            base_url,
            limiter: RateLimiter::with_limit(config.reads_per_sec),
            config,
        })
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, Error> {
        if !self.limiter.try_read() {
            debug!(path, "read throttled");
            self.limiter.wait_read().await;
        }

        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        if status_code != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::KalshiApi {
                status: status_code,
                message: summarize_response_body(&body),
            });
        }

        resp.json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))
    }

    /// Fetch one page of markets.
    async fn get_markets_page(&self, cursor: Option<&str>) -> Result<MarketsPage, Error> {
        let mut query = vec![
            ("limit", self.config.page_limit.to_string()),
            ("mve_filter", "exclude".to_string()),
        ];
        if !self.config.search_status.is_empty() {
            query.push(("status", self.config.search_status.clone()));
        }
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }

        let body = self.get_json("/markets", &query).await?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Case-insensitive substring match against title and ticker.
fn market_matches(market: &RawMarket, needle: &str) -> bool {
    let field = |key: &str| {
        market
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .unwrap_or_default()
    };
    field("title").contains(needle) || field("ticker").contains(needle)
}

/// Kalshi series tickers are the market ticker up to the first dash.
fn series_ticker(ticker: &str) -> &str {
    ticker.split('-').next().unwrap_or(ticker)
}

/// A candle price field in probability units: integer cents or a `*_dollars` string.
fn candle_price(price: &Value, key: &str) -> Option<f64> {
    if let Some(cents) = price.get(key).and_then(Value::as_f64) {
        return Some(cents / 100.0);
    }
    price
        .get(format!("{}_dollars", key))
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        })
}

fn parse_candles(body: &Value) -> Vec<Candle> {
    let Some(rows) = body.get("candlesticks").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| {
            let end_ts = row.get("end_period_ts").and_then(Value::as_i64)?;
            let price = row.get("price").cloned().unwrap_or(Value::Null);
            Some(Candle {
                end_ts,
                open: candle_price(&price, "open"),
                high: candle_price(&price, "high"),
                low: candle_price(&price, "low"),
                close: candle_price(&price, "close"),
                volume: row.get("volume").and_then(Value::as_i64).unwrap_or(0),
                open_interest: row.get("open_interest").and_then(Value::as_i64).unwrap_or(0),
            })
        })
        .collect();

    candles.sort_by_key(|c| c.end_ts);
    candles
}

#[async_trait]
impl MarketDataSource for KalshiRestClient {
    #[instrument(skip(self))]
    async fn fetch(&self, ticker: &str) -> Result<RawMarket, Error> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(Error::MarketNotFound("empty ticker".into()));
        }

        let body = match self.get_json(&format!("/markets/{}", ticker), &[]).await {
            Err(Error::KalshiApi { status: 404, .. }) => {
                return Err(Error::MarketNotFound(ticker.to_string()))
            }
            other => other?,
        };

        // The market usually sits under "market"; accept a bare record too.
        let market = match body {
            Value::Object(mut map) => match map.remove("market") {
                Some(Value::Object(inner)) => inner,
                Some(_) | None => map,
            },
            _ => return Err(Error::Other("market response was not an object".into())),
        };
        Ok(market)
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<RawMarket>, Error> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        while pages < self.config.max_pages && results.len() < self.config.max_results {
            let page = self.get_markets_page(cursor.as_deref()).await?;
            pages += 1;

            for market in page.markets {
                if market_matches(&market, &needle) {
                    results.push(market);
                    if results.len() >= self.config.max_results {
                        break;
                    }
                }
            }

            debug!("Searched {} pages ({} matches)", pages, results.len());

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl CandleSource for KalshiRestClient {
    #[instrument(skip(self))]
    async fn fetch_candles(&self, ticker: &str, window: CandleWindow) -> Result<Vec<Candle>, Error> {
        let end_ts = Utc::now().timestamp();
        let start_ts = end_ts - i64::from(window.lookback_hours) * 3600;
        let path = format!(
            "/series/{}/markets/{}/candlesticks",
            series_ticker(ticker),
            ticker
        );
        let query = [
            ("start_ts", start_ts.to_string()),
            ("end_ts", end_ts.to_string()),
            ("period_interval", window.period_minutes.to_string()),
        ];

        let body = self.get_json(&path, &query).await?;
        let candles = parse_candles(&body);
        debug!("Fetched {} candles for {}", candles.len(), ticker);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_is_prefix_before_first_dash() {
        assert_eq!(series_ticker("KXHIGHNYC-25JAN01-T50"), "KXHIGHNYC");
        assert_eq!(series_ticker("PLAIN"), "PLAIN");
    }

    #[test]
    fn search_matches_title_or_ticker_case_insensitively() {
        let market: RawMarket = serde_json::from_value(json!({
            "ticker": "KXNCAAMB-26",
            "title": "Will Duke win the NCAA title?"
        }))
        .unwrap();
        assert!(market_matches(&market, "duke"));
        assert!(market_matches(&market, "kxncaamb"));
        assert!(!market_matches(&market, "gonzaga"));
    }

    #[test]
    fn candles_convert_cents_and_keep_missing_closes() {
        let body = json!({
            "candlesticks": [
                {"end_period_ts": 200, "price": {"close": null}, "volume": 3, "open_interest": 9},
                {"end_period_ts": 100, "price": {"open": 40, "close": 42}, "volume": 5, "open_interest": 8},
                {"end_period_ts": 300, "price": {"close_dollars": "0.4500"}},
                {"price": {"close": 50}}
            ]
        });
        let candles = parse_candles(&body);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].end_ts, 100);
        assert_eq!(candles[0].close, Some(0.42));
        assert_eq!(candles[0].open, Some(0.40));
        assert_eq!(candles[1].close, None);
        assert_eq!(candles[1].volume, 3);
        assert_eq!(candles[2].close, Some(0.45));
        assert_eq!(candles[2].volume, 0);
    }

    #[test]
    fn empty_or_malformed_candle_body_yields_nothing() {
        assert!(parse_candles(&json!({})).is_empty());
        assert!(parse_candles(&json!({"candlesticks": "nope"})).is_empty());
    }

    #[test]
    fn long_error_bodies_are_summarized() {
        let body = "x".repeat(2000);
        let summary = summarize_response_body(&body);
        assert_eq!(summary.chars().count(), 801);
    }

    #[test]
    fn malformed_base_url_is_a_config_error() {
        if std::env::var("KALSHI_API_BASE_URL").is_ok() {
            return;
        }
        for api_base in ["not a url", "ftp://api.kalshi.test"] {
            let config = KalshiClientConfig {
                api_base: api_base.into(),
                ..Default::default()
            };
            let err = KalshiRestClient::new(config).err().unwrap();
            assert!(matches!(err, Error::Config(_)), "{}: {:?}", api_base, err);
        }
    }

    #[test]
    fn configured_base_url_is_normalized() {
        if std::env::var("KALSHI_API_BASE_URL").is_ok() {
            return;
        }
        let config = KalshiClientConfig {
            api_base: " https://demo-api.kalshi.co/ ".into(),
            ..Default::default()
        };
        let client = KalshiRestClient::new(config).unwrap();
        assert_eq!(
            client.url("/markets/X"),
            "https://demo-api.kalshi.co/trade-api/v2/markets/X"
        );
    }
}
