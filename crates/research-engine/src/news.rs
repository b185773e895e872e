//! Directional evaluator: estimated P(YES) from recent news coverage.
//!
//! Flow: build a query, fetch articles, ask the reasoning service for
//! `p_yes`, map it onto BUY YES / BUY NO / abstain. No articles means no
//! estimate call.

use std::sync::Arc;
use std::time::Duration;

use common::text::shorten;
use common::{AgentOutput, MarketContext, Side};
use llm_client::{
    consult, from_schema, system_prompt_with_schema, Prompt, Reasoned, ReasoningError,
    ReasoningService,
};
use news_client::{Article, ArticleSource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const AGENT_NAME: &str = "NewsEvidenceAgent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Title-derived query, no extra reasoning call.
    Heuristic,
    /// Ask the reasoning service for a query; heuristic on failure.
    Reasoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsEvidenceConfig {
    /// `p_yes` at or above this buys YES.
    pub buy_yes_at: f64,
    /// `p_yes` at or below this buys NO.
    pub buy_no_at: f64,
    pub max_articles: usize,
    pub max_article_chars: usize,
    /// Title and each rules text are cut to this many characters in prompts.
    pub max_rules_chars: usize,
    pub reasoning_timeout_ms: u64,
    pub query_mode: QueryMode,
}

impl Default for NewsEvidenceConfig {
    fn default() -> Self {
        Self {
            buy_yes_at: 0.55,
            buy_no_at: 0.45,
            max_articles: 10,
            max_article_chars: 400,
            max_rules_chars: 4_000,
            reasoning_timeout_ms: 20_000,
            query_mode: QueryMode::Heuristic,
        }
    }
}

/// The reasoning service's reading of the articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceReading {
    /// Probability the market resolves YES, 0..1.
    pub p_yes: f64,
    /// How much the articles actually bear on resolution, 0..1.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub summary: String,
}

impl EvidenceReading {
    fn neutral() -> Self {
        Self {
            p_yes: 0.5,
            confidence: 0.0,
            summary: "Evidence analysis failed.".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct QueryReading {
    /// NewsAPI `q` parameter.
    query: String,
}

const MAX_SUMMARY_CHARS: usize = 300;

fn validate_evidence(value: Value) -> Result<EvidenceReading, ReasoningError> {
    let mut reading: EvidenceReading = from_schema(value)?;
    if !reading.p_yes.is_finite() || !reading.confidence.is_finite() {
        return Err(ReasoningError::SchemaViolation("non-finite probability".into()));
    }
    reading.p_yes = reading.p_yes.clamp(0.0, 1.0);
    reading.confidence = reading.confidence.clamp(0.0, 1.0);
    reading.summary = shorten(&reading.summary, MAX_SUMMARY_CHARS);
    Ok(reading)
}

fn validate_query(value: Value) -> Result<String, ReasoningError> {
    let reading: QueryReading = from_schema(value)?;
    let query = reading.query.trim();
    if query.is_empty() {
        return Err(ReasoningError::SchemaViolation("empty query".into()));
    }
    Ok(query.to_string())
}

/// Title-based NewsAPI query: drop question framing, widen with the event ticker.
pub fn heuristic_query(ctx: &MarketContext) -> String {
    let title = ctx.title_str();
    let mut query = title.to_string();
    if let Some(event) = ctx.event_ticker.as_deref().map(str::trim) {
        if !event.is_empty() && event != title {
            query.push_str(" OR ");
            query.push_str(event);
        }
    }
    query
        .replace("Will ", "")
        .replace("will ", "")
        .replace('?', "")
        .trim()
        .to_string()
}

/// Edge strength of a probability estimate.
pub fn edge_score(p_yes: f64) -> f64 {
    ((p_yes - 0.5).abs() * 2.0).clamp(0.0, 1.0)
}

const EVIDENCE_ROLE: &str = "You are an evidence-based analyst for binary markets.
You will be given market title + rules and a list of news articles.
Estimate the probability the market resolves YES based ONLY on the provided articles.

Calibration rules:
- If articles are mostly indirect (rankings, odds, punditry, general discussion), keep p_yes near 0.50 and confidence low.
- Use high p_yes (>0.65) ONLY when articles contain strong, direct evidence tied to the resolution criteria.
- For long-horizon outcomes, even the favorite is usually not very likely; avoid extreme probabilities.
- If evidence is weak or unrelated, set p_yes near 0.50 and confidence low.";

const QUERY_ROLE: &str = "You generate a NewsAPI query string for the `q` parameter (NewsAPI /v2/everything).
Goal: retrieve SOME relevant articles even if exact wording varies.
- Be broad enough to return results. Use at most one quoted phrase.
- Prefer: <main_entity> AND (<syn1> OR <syn2> OR <syn3>), 2-5 short keywords total.
- Avoid filler words and dates unless critical. Keep the query under 120 characters.";

pub struct NewsEvidenceEvaluator {
    service: Arc<dyn ReasoningService>,
    articles: Arc<dyn ArticleSource>,
    config: NewsEvidenceConfig,
}

impl NewsEvidenceEvaluator {
    pub fn new(
        service: Arc<dyn ReasoningService>,
        articles: Arc<dyn ArticleSource>,
        config: NewsEvidenceConfig,
    ) -> Self {
        Self {
            service,
            articles,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.reasoning_timeout_ms)
    }

    /// Returns the query and, in reasoned mode, the builder's diagnostic.
    async fn build_query(&self, ctx: &MarketContext) -> (String, Value) {
        let fallback = heuristic_query(ctx);
        if self.config.query_mode == QueryMode::Heuristic {
            return (fallback, json!({"mode": "heuristic"}));
        }

        let payload = json!({
            "title": self.cap(&ctx.title),
            "event_ticker": ctx.event_ticker,
            "rules_primary": ctx.rules_primary.as_deref().map(|r| shorten(r, 1_000)),
        });
        let prompt = Prompt::new(
            "news_query",
            system_prompt_with_schema::<QueryReading>(QUERY_ROLE),
            format!("Create a NewsAPI query for this market.\n\n{}", payload),
        );

        match consult(self.service.as_ref(), &prompt, self.timeout(), validate_query).await {
            Reasoned::Parsed(query) => (query, json!({"mode": "reasoned"})),
            Reasoned::Fallback(err) => (
                fallback,
                json!({"mode": "reasoned", "fallback": err.code()}),
            ),
        }
    }

    async fn fetch_articles(&self, query: &str) -> Vec<Article> {
        match self.articles.search(query).await {
            Ok(mut articles) => {
                articles.truncate(self.config.max_articles);
                articles
            }
            Err(e) => {
                warn!(query, "article search failed, treating as no articles: {}", e);
                Vec::new()
            }
        }
    }

    fn cap(&self, text: &Option<String>) -> Option<String> {
        text.as_deref().map(|t| shorten(t, self.config.max_rules_chars))
    }

    /// Articles as sent to the reasoning service: long text fields cut down.
    fn compact_articles(&self, articles: &[Article]) -> Vec<Article> {
        let cap = self.config.max_article_chars;
        articles
            .iter()
            .map(|a| Article {
                title: shorten(&a.title, cap),
                description: shorten(&a.description, cap),
                content: shorten(&a.content, cap),
                url: a.url.clone(),
                published_at: a.published_at.clone(),
                source: a.source.clone(),
            })
            .collect()
    }

    pub async fn evaluate(&self, ctx: &MarketContext) -> AgentOutput {
        if ctx.title_str().is_empty() {
            return AgentOutput::abstain(
                AGENT_NAME,
                0.0,
                "Missing title; cannot run news analysis.",
            );
        }

        let (query, query_builder) = self.build_query(ctx).await;
        let articles = self.fetch_articles(&query).await;
        debug!(query = %query, found = articles.len(), "news articles");

        if articles.is_empty() {
            return AgentOutput::abstain(
                AGENT_NAME,
                0.0,
                "No relevant news articles found; abstaining.",
            )
            .with_signals(json!({"query": query, "articles_found": 0}))
            .with_raw(json!({"query_builder": query_builder, "articles": []}));
        }

        let compact = self.compact_articles(&articles);
        let payload = json!({
            "title": self.cap(&ctx.title),
            "rules_primary": self.cap(&ctx.rules_primary),
            "rules_secondary": self.cap(&ctx.rules_secondary),
            "articles": compact,
        });
        let prompt = Prompt::new(
            "news_evidence",
            system_prompt_with_schema::<EvidenceReading>(EVIDENCE_ROLE),
            format!(
                "Estimate P(YES) for this market using only the provided articles.\nReturn STRICT JSON only.\n\n{}",
                payload
            ),
        );

        let (reading, fallback) =
            match consult(self.service.as_ref(), &prompt, self.timeout(), validate_evidence).await {
                Reasoned::Parsed(reading) => (reading, None),
                Reasoned::Fallback(err) => (EvidenceReading::neutral(), Some(err.code())),
            };

        let p_yes = reading.p_yes;
        let score = edge_score(p_yes);
        let side = if p_yes >= self.config.buy_yes_at {
            Some(Side::Yes)
        } else if p_yes <= self.config.buy_no_at {
            Some(Side::No)
        } else {
            None
        };

        let signals = json!({
            "query": query,
            "p_yes": p_yes,
            "confidence": reading.confidence,
            "articles_found": articles.len(),
            "fallback": fallback,
        });
        let raw = json!({
            "query_builder": query_builder,
            "articles": compact,
            "evidence": reading,
        });

        let out = match side {
            Some(side) => AgentOutput::buy(
                AGENT_NAME,
                side,
                score,
                format!(
                    "P(YES)≈{:.2}; BUY {}. edge_score={:.2}, confidence={:.2}. {}",
                    p_yes, side, score, reading.confidence, reading.summary
                ),
            ),
            None => AgentOutput::abstain(
                AGENT_NAME,
                score,
                format!(
                    "P(YES)≈{:.2} (no clear edge). confidence={:.2}. {}",
                    p_yes, reading.confidence, reading.summary
                ),
            ),
        };
        out.with_signals(signals).with_raw(raw)
    }
}
