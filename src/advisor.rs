//! One evaluation, end to end: normalize, run every evaluator, aggregate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Candle, RawMarket, Recommendation};
use decision_engine::Aggregator;
use llm_client::ReasoningService;
use news_client::ArticleSource;
use research_engine::{NewsEvidenceEvaluator, RulesEvaluator};
use signal_engine::{build_market_context_at, pricing, risk, trend, RiskConfig, TrendConfig};
use tracing::{debug, info, instrument};

use crate::config::AppConfig;

pub struct Advisor {
    risk: RiskConfig,
    trend: TrendConfig,
    rules: RulesEvaluator,
    news: NewsEvidenceEvaluator,
    aggregator: Aggregator,
}

impl Advisor {
    pub fn new(
        service: Arc<dyn ReasoningService>,
        articles: Arc<dyn ArticleSource>,
        config: &AppConfig,
    ) -> Self {
        Self {
            risk: config.risk.clone(),
            trend: config.trend.clone(),
            rules: RulesEvaluator::new(service.clone(), config.rules.clone()),
            news: NewsEvidenceEvaluator::new(
                service.clone(),
                articles,
                config.news_evidence.clone(),
            ),
            aggregator: Aggregator::new(service, config.aggregator.clone()),
        }
    }

    /// Evaluate `raw` as of now. `None` candles means no trend history.
    pub async fn evaluate(&self, raw: &RawMarket, candles: Option<&[Candle]>) -> Recommendation {
        self.evaluate_at(raw, candles, Utc::now()).await
    }

    /// Evaluate `raw` as of `now`. Never fails; the worst case is `NO_TRADE`.
    #[instrument(skip_all, fields(ticker = tracing::field::Empty))]
    pub async fn evaluate_at(
        &self,
        raw: &RawMarket,
        candles: Option<&[Candle]>,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let ctx = build_market_context_at(raw, now);
        tracing::Span::current().record("ticker", ctx.ticker_str());

        let risk_out = risk::evaluate(&ctx, &self.risk);
        let pricing_out = pricing::evaluate(&ctx);
        let trend_out = trend::evaluate(&ctx, candles.unwrap_or(&[]), &self.trend);

        let (rules_out, news_out) = tokio::join!(self.rules.evaluate(&ctx), self.news.evaluate(&ctx));

        let outputs = vec![risk_out, pricing_out, trend_out, rules_out, news_out];
        for out in &outputs {
            debug!(
                agent = out.agent(),
                verdict = ?out.verdict(),
                score = out.score(),
                "evaluator output"
            );
        }

        let rec = self.aggregator.aggregate(&ctx, outputs).await;
        info!(
            action = %rec.action(),
            direction = ?rec.direction(),
            confidence = rec.confidence(),
            "recommendation ready"
        );
        rec
    }
}
