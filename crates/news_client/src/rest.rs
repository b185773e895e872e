//! NewsAPI client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::Error;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::types::{Article, ArticleSource};

const NEWSAPI_BASE_URL: &str = "https://newsapi.org";
const DEFAULT_LOOKBACK_DAYS: i64 = 7;
const MAX_ERROR_BODY_CHARS: usize = 800;

/// `from` date for a search window ending at `now`. Negative spans clamp to
/// today; spans chrono cannot represent use the default week.
fn lookback_start(now: DateTime<Utc>, lookback_days: i64) -> String {
    let start = TimeDelta::try_days(lookback_days.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or_else(|| {
            warn!(lookback_days, "lookback out of range, using {} days", DEFAULT_LOOKBACK_DAYS);
            now - TimeDelta::days(DEFAULT_LOOKBACK_DAYS)
        });
    start.format("%Y-%m-%d").to_string()
}

/// Single-line, bounded copy of an error body for logs and error values.
fn summarize_error_body(raw: &str) -> String {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() > MAX_ERROR_BODY_CHARS {
        format!("{}…", compact.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>())
    } else {
        compact
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// `pageSize` sent with every search.
    pub max_articles: u32,
    /// Only articles published within this many days are requested.
    pub lookback_days: i64,
    pub language: String,
    pub sort_by: String,
}

impl Default for NewsClientConfig {
    fn default() -> Self {
        Self {
            base_url: NEWSAPI_BASE_URL.to_string(),
            timeout_ms: 10_000,
            max_articles: 10,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            language: "en".into(),
            sort_by: "relevancy".into(),
        }
    }
}

#[derive(Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Deserialize)]
struct ApiArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<ApiSource>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiSource {
    Named { name: Option<String> },
    Plain(String),
}

impl From<ApiArticle> for Article {
    fn from(a: ApiArticle) -> Self {
        let source = match a.source {
            Some(ApiSource::Named { name }) => name.unwrap_or_default(),
            Some(ApiSource::Plain(s)) => s,
            None => String::new(),
        };
        Article {
            title: a.title.unwrap_or_default(),
            description: a.description.unwrap_or_default(),
            content: a.content.unwrap_or_default(),
            url: a.url.unwrap_or_default(),
            published_at: a.published_at.unwrap_or_default(),
            source,
        }
    }
}

pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    config: NewsClientConfig,
}

impl NewsApiClient {
    pub fn new(api_key: String, config: NewsClientConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }
}

#[async_trait]
impl ArticleSource for NewsApiClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<Article>, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let from = lookback_start(Utc::now(), self.config.lookback_days);
        let url = format!(
            "{}/v2/everything",
            self.config.base_url.trim_end_matches('/')
        );

        let resp = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("from", from),
                ("language", self.config.language.clone()),
                ("sortBy", self.config.sort_by.clone()),
                ("pageSize", self.config.max_articles.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = summarize_error_body(&resp.text().await.unwrap_or_default());
            return Err(Error::NewsApi {
                status: status.as_u16(),
                message,
            });
        }

        let body: EverythingResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let articles: Vec<Article> = body.articles.into_iter().map(Article::from).collect();
        debug!("NewsAPI returned {} articles", articles.len());
        Ok(articles)
    }
}
