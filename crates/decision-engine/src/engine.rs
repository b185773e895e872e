use std::sync::Arc;
use std::time::Duration;

use common::text::{join_reasons, shorten, MAX_EXPLANATION_CHARS};
use common::{Action, AgentOutput, MarketContext, Recommendation, Side};
use llm_client::{
    consult, system_prompt_with_schema, Prompt, Reasoned, ReasoningError, ReasoningService,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::payload::PromptPayload;
use crate::types::{AggregateVerdict, AggregatorConfig};

const ROLE: &str = "You are an AggregationAgent for a prediction-market assistant.
You will receive a JSON payload with:
  market_snapshot: basic market context
  agents: a list of agent outputs (agent, action, direction, score, reason, signals)

Hard rules:
1) If any agent has action==\"NO_TRADE\", you MUST output action=\"NO_TRADE\".
2) Never invent facts not present in input.
3) If evidence is mixed or weak, prefer NO_TRADE.

Guidance:
- Treat agent.score as that agent's confidence/strength (0..1).
- TrendCandlesAgent is strong when momentum & MA agree and volume confirms; reduce confidence if volatility is high.
- PricingBaselineAgent is weak evidence; use mostly as tie-breaker.
- NewsEvidenceAgent with p_yes near 0.50 is neutral.
- explanation must be at most 280 characters.";

pub struct Aggregator {
    service: Arc<dyn ReasoningService>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(service: Arc<dyn ReasoningService>, config: AggregatorConfig) -> Self {
        Self { service, config }
    }

    /// Merge every evaluator's output into one recommendation.
    ///
    /// A veto anywhere is final and skips the reasoning call. Otherwise the
    /// reasoning service proposes the call and any unusable reply routes to
    /// [`deterministic_fallback`].
    pub async fn aggregate(&self, ctx: &MarketContext, outputs: Vec<AgentOutput>) -> Recommendation {
        if let Some(rec) = hard_veto(&outputs) {
            return rec;
        }

        let payload = PromptPayload::build(ctx, &outputs, &self.config);
        let prompt = Prompt::new(
            "aggregate",
            system_prompt_with_schema::<AggregateVerdict>(ROLE),
            format!(
                "Aggregate the following JSON into a final recommendation.\nReturn STRICT JSON only.\n\nINPUT JSON:\n{}",
                payload.to_pretty_json()
            ),
        );
        let timeout = Duration::from_millis(self.config.reasoning_timeout_ms);

        match consult(self.service.as_ref(), &prompt, timeout, validate_verdict).await {
            Reasoned::Parsed(verdict) => {
                info!(
                    action = %verdict.action,
                    confidence = verdict.confidence,
                    "aggregated recommendation"
                );
                match (verdict.action, verdict.direction) {
                    (Action::Buy, Some(side)) => {
                        Recommendation::buy(side, verdict.confidence, verdict.explanation, outputs)
                    }
                    _ => Recommendation::no_trade(verdict.confidence, verdict.explanation, outputs),
                }
            }
            Reasoned::Fallback(err) => deterministic_fallback(outputs, &err),
        }
    }
}

/// `NO_TRADE` from any evaluator ends the evaluation here.
///
/// Confidence is the weakest vetoing score; the explanation joins the veto reasons.
pub fn hard_veto(outputs: &[AgentOutput]) -> Option<Recommendation> {
    let vetoes: Vec<&AgentOutput> = outputs.iter().filter(|o| o.is_veto()).collect();
    if vetoes.is_empty() {
        return None;
    }

    let confidence = vetoes.iter().map(|o| o.score()).fold(f64::INFINITY, f64::min);
    let mut explanation = join_reasons(vetoes.iter().map(|o| o.reason()));
    if explanation.is_empty() {
        explanation = "One or more agents vetoed this market.".into();
    }

    info!(
        vetoed_by = ?vetoes.iter().map(|o| o.agent()).collect::<Vec<_>>(),
        "hard veto, skipping reasoning call"
    );
    Some(Recommendation::no_trade(
        confidence,
        explanation,
        outputs.to_vec(),
    ))
}

/// Local answer used when the reasoning step is unusable.
///
/// Picks the highest-scoring BUY (first on ties). Confidence is the minimum
/// score across all outputs. The explanation always ends with the fallback code.
pub fn deterministic_fallback(outputs: Vec<AgentOutput>, err: &ReasoningError) -> Recommendation {
    warn!(code = err.code(), "aggregation fallback: {}", err);

    let best = outputs
        .iter()
        .filter_map(|o| o.direction().map(|side| (side, o)))
        .fold(None::<(Side, &AgentOutput)>, |best, (side, o)| match best {
            Some((_, b)) if b.score() >= o.score() => best,
            _ => Some((side, o)),
        });

    let confidence = if outputs.is_empty() {
        0.0
    } else {
        outputs.iter().map(|o| o.score()).fold(f64::INFINITY, f64::min)
    };

    let mut body = join_reasons(outputs.iter().map(|o| o.reason()));
    if body.is_empty() {
        body = match best {
            Some((_, o)) => format!("Direction chosen by {}.", o.agent()),
            None => "No agent recommended a trade.".into(),
        };
    }

    let note = format!("(fallback: {})", err.code());
    let room = MAX_EXPLANATION_CHARS.saturating_sub(note.chars().count() + 1);
    let explanation = format!("{} {}", shorten(&body, room), note);

    match best.map(|(side, _)| side) {
        Some(side) => Recommendation::buy(side, confidence, explanation, outputs),
        None => Recommendation::no_trade(confidence, explanation, outputs),
    }
}

/// Strict check of the reasoning reply.
///
/// `action` must be exactly `BUY` or `NO_TRADE`; on `BUY`, `direction` must be
/// exactly `YES` or `NO`. `confidence` must be a number and is clamped;
/// `explanation` must be a string and is bounded.
pub fn validate_verdict(value: Value) -> Result<AggregateVerdict, ReasoningError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ReasoningError::SchemaViolation("expected a JSON object".into()))?;

    let action = match obj.get("action").and_then(Value::as_str) {
        Some("BUY") => Action::Buy,
        Some("NO_TRADE") => Action::NoTrade,
        other => {
            return Err(ReasoningError::SchemaViolation(format!(
                "invalid action: {:?}",
                other
            )))
        }
    };

    let direction = match action {
        Action::NoTrade => None,
        Action::Buy => match obj.get("direction").and_then(Value::as_str) {
            Some("YES") => Some(Side::Yes),
            Some("NO") => Some(Side::No),
            other => {
                return Err(ReasoningError::SchemaViolation(format!(
                    "BUY requires direction YES or NO, got {:?}",
                    other
                )))
            }
        },
    };

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .ok_or_else(|| ReasoningError::SchemaViolation("confidence must be a number".into()))?
        .clamp(0.0, 1.0);

    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .ok_or_else(|| ReasoningError::SchemaViolation("explanation must be a string".into()))?;
    let mut explanation = shorten(explanation, MAX_EXPLANATION_CHARS);
    if explanation.is_empty() {
        explanation = "Aggregated recommendation.".into();
    }

    Ok(AggregateVerdict {
        action,
        direction,
        confidence,
        explanation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        reply: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<Prompt>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReasoningService for Scripted {
        async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.clone());
            Ok(self.reply.clone())
        }
    }

    struct Hangs;

    #[async_trait]
    impl ReasoningService for Hangs {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, ReasoningError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn ctx() -> MarketContext {
        MarketContext {
            ticker: Some("KXTEST-1".into()),
            yes_ask: Some(0.4),
            no_ask: Some(0.62),
            ..Default::default()
        }
    }

    fn two_buys() -> Vec<AgentOutput> {
        vec![
            AgentOutput::buy("TrendCandlesAgent", Side::Yes, 0.9, "Uptrend"),
            AgentOutput::buy("NewsEvidenceAgent", Side::No, 0.3, "P(YES)≈0.35"),
        ]
    }

    #[tokio::test]
    async fn any_veto_wins_without_reasoning_call() {
        let service = Scripted::new(r#"{"action": "BUY", "direction": "YES", "confidence": 0.9, "explanation": "go"}"#);
        let agg = Aggregator::new(service.clone(), AggregatorConfig::default());

        let mut outputs = two_buys();
        outputs.push(AgentOutput::buy("PricingBaselineAgent", Side::Yes, 0.8, "cheap"));
        outputs.push(AgentOutput::no_trade("RiskAgent", 0.0, "Quotes are stale (quote_age_s=3600s)."));
        outputs.push(AgentOutput::no_trade("RulesAgent", 0.6, "Ambiguity/low clarity: [] (score=0.60)"));

        let rec = agg.aggregate(&ctx(), outputs).await;
        assert_eq!(rec.action(), Action::NoTrade);
        assert_eq!(rec.direction(), None);
        assert_eq!(rec.confidence(), 0.0);
        assert_eq!(
            rec.explanation(),
            "Quotes are stale (quote_age_s=3600s). | Ambiguity/low clarity: [] (score=0.60)"
        );
        assert_eq!(rec.agents().len(), 5);
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_to_best_buy_with_min_confidence() {
        let service = Scripted::new("I think you should buy YES!");
        let agg = Aggregator::new(service.clone(), AggregatorConfig::default());

        let rec = agg.aggregate(&ctx(), two_buys()).await;
        assert_eq!(rec.action(), Action::Buy);
        assert_eq!(rec.direction(), Some(Side::Yes));
        assert_eq!(rec.confidence(), 0.3);
        assert!(rec.explanation().ends_with("(fallback: REASONING_NON_JSON)"));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn valid_reply_is_used() {
        let service = Scripted::new(
            r#"{"action": "BUY", "direction": "NO", "confidence": 1.3, "explanation": "News points to NO."}"#,
        );
        let rec = Aggregator::new(service.clone(), AggregatorConfig::default())
            .aggregate(&ctx(), two_buys())
            .await;
        assert_eq!(rec.direction(), Some(Side::No));
        assert_eq!(rec.confidence(), 1.0);
        assert_eq!(rec.explanation(), "News points to NO.");

        let prompt = service.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.system.contains("you MUST output action=\"NO_TRADE\""));
        assert!(prompt.user.contains("\"market_snapshot\""));
        assert!(prompt.user.contains("TrendCandlesAgent"));
    }

    #[tokio::test]
    async fn no_trade_reply_ignores_direction() {
        let service = Scripted::new(
            r#"{"action": "NO_TRADE", "direction": "maybe", "confidence": 0.4, "explanation": "Mixed."}"#,
        );
        let rec = Aggregator::new(service, AggregatorConfig::default())
            .aggregate(&ctx(), two_buys())
            .await;
        assert_eq!(rec.action(), Action::NoTrade);
        assert_eq!(rec.direction(), None);
        assert_eq!(rec.confidence(), 0.4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_routes_to_fallback() {
        let agg = Aggregator::new(Arc::new(Hangs), AggregatorConfig::default());
        let rec = agg.aggregate(&ctx(), two_buys()).await;
        assert_eq!(rec.direction(), Some(Side::Yes));
        assert!(rec.explanation().ends_with("(fallback: REASONING_TIMEOUT)"));
    }

    #[test]
    fn verdict_validation_is_exact() {
        let bad = [
            serde_json::json!({"action": "buy", "direction": "YES", "confidence": 0.5, "explanation": "x"}),
            serde_json::json!({"action": "BUY", "direction": "yes", "confidence": 0.5, "explanation": "x"}),
            serde_json::json!({"action": "BUY", "direction": null, "confidence": 0.5, "explanation": "x"}),
            serde_json::json!({"action": "BUY", "direction": "YES", "confidence": "high", "explanation": "x"}),
            serde_json::json!({"action": "BUY", "direction": "YES", "confidence": 0.5}),
            serde_json::json!({"action": "HOLD", "confidence": 0.5, "explanation": "x"}),
            serde_json::json!(["BUY"]),
        ];
        for value in bad {
            assert!(
                matches!(validate_verdict(value.clone()), Err(ReasoningError::SchemaViolation(_))),
                "accepted {value}"
            );
        }

        let long = "x".repeat(1_000);
        let ok = validate_verdict(serde_json::json!({
            "action": "NO_TRADE", "confidence": -2, "explanation": long
        }))
        .unwrap();
        assert_eq!(ok.confidence, 0.0);
        assert_eq!(ok.explanation.chars().count(), MAX_EXPLANATION_CHARS);
    }

    #[test]
    fn fallback_without_buys_is_no_trade() {
        let outputs = vec![
            AgentOutput::abstain("RiskAgent", 1.0, "Pricing sanity ok"),
            AgentOutput::abstain("PricingBaselineAgent", 0.2, "equal asks"),
        ];
        let rec = deterministic_fallback(outputs, &ReasoningError::Timeout);
        assert_eq!(rec.action(), Action::NoTrade);
        assert_eq!(rec.confidence(), 0.2);
    }

    #[test]
    fn fallback_ties_keep_first_buy() {
        let outputs = vec![
            AgentOutput::buy("PricingBaselineAgent", Side::No, 0.5, "NO cheaper"),
            AgentOutput::buy("TrendCandlesAgent", Side::Yes, 0.5, "Uptrend"),
        ];
        let rec = deterministic_fallback(outputs, &ReasoningError::Timeout);
        assert_eq!(rec.direction(), Some(Side::No));
    }

    #[test]
    fn fallback_on_empty_outputs() {
        let rec = deterministic_fallback(Vec::new(), &ReasoningError::Unavailable("offline".into()));
        assert_eq!(rec.action(), Action::NoTrade);
        assert_eq!(rec.confidence(), 0.0);
        assert_eq!(
            rec.explanation(),
            "No agent recommended a trade. (fallback: REASONING_UNAVAILABLE)"
        );
    }

    #[test]
    fn fallback_explanation_keeps_note_within_bound() {
        let outputs = vec![AgentOutput::buy("TrendCandlesAgent", Side::Yes, 0.7, "y".repeat(490))];
        let rec = deterministic_fallback(outputs, &ReasoningError::NonJson("x".into()));
        assert!(rec.explanation().chars().count() <= MAX_EXPLANATION_CHARS);
        assert!(rec.explanation().ends_with("(fallback: REASONING_NON_JSON)"));
    }
}
