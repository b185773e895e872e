//! The output contract every evaluator returns, and the final recommendation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::text::{shorten, MAX_EXPLANATION_CHARS, MAX_REASON_CHARS};
use crate::types::{Action, Side};

/// What an evaluator concluded. A direction only exists on a buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Buy(Side),
    NoTrade,
    Abstain,
}

impl Verdict {
    pub fn action(&self) -> Option<Action> {
        match self {
            Verdict::Buy(_) => Some(Action::Buy),
            Verdict::NoTrade => Some(Action::NoTrade),
            Verdict::Abstain => None,
        }
    }

    pub fn direction(&self) -> Option<Side> {
        match self {
            Verdict::Buy(side) => Some(*side),
            _ => None,
        }
    }

    fn from_parts(action: Option<Action>, direction: Option<Side>) -> Result<Self, Error> {
        match (action, direction) {
            (Some(Action::Buy), Some(side)) => Ok(Verdict::Buy(side)),
            (Some(Action::Buy), None) => Err(Error::InvalidAgentOutput(
                "BUY requires a direction".into(),
            )),
            (Some(Action::NoTrade), None) => Ok(Verdict::NoTrade),
            (None, None) => Ok(Verdict::Abstain),
            (_, Some(side)) => Err(Error::InvalidAgentOutput(format!(
                "direction {} is only allowed on BUY",
                side
            ))),
        }
    }
}

/// One evaluator's opinion about a market snapshot.
///
/// Fields are private so the direction/action invariant holds for every value:
/// construct through [`AgentOutput::buy`], [`AgentOutput::no_trade`] or
/// [`AgentOutput::abstain`]. Scores are clamped to [0,1] and reasons bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AgentOutputRecord", into = "AgentOutputRecord")]
pub struct AgentOutput {
    agent: String,
    verdict: Verdict,
    score: f64,
    reason: String,
    signals: Map<String, Value>,
    raw: Option<Value>,
}

impl AgentOutput {
    fn build(agent: &str, verdict: Verdict, score: f64, reason: impl AsRef<str>) -> Self {
        Self {
            agent: agent.to_string(),
            verdict,
            score: clamp01(score),
            reason: shorten(reason.as_ref(), MAX_REASON_CHARS),
            signals: Map::new(),
            raw: None,
        }
    }

    pub fn buy(agent: &str, side: Side, score: f64, reason: impl AsRef<str>) -> Self {
        Self::build(agent, Verdict::Buy(side), score, reason)
    }

    pub fn no_trade(agent: &str, score: f64, reason: impl AsRef<str>) -> Self {
        Self::build(agent, Verdict::NoTrade, score, reason)
    }

    pub fn abstain(agent: &str, score: f64, reason: impl AsRef<str>) -> Self {
        Self::build(agent, Verdict::Abstain, score, reason)
    }

    /// Attach diagnostic signals. Non-object values are ignored.
    pub fn with_signals(mut self, signals: Value) -> Self {
        if let Value::Object(map) = signals {
            self.signals = map;
        }
        self
    }

    /// Attach an audit payload. Never read by decision logic.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn action(&self) -> Option<Action> {
        self.verdict.action()
    }

    pub fn direction(&self) -> Option<Side> {
        self.verdict.direction()
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn signals(&self) -> &Map<String, Value> {
        &self.signals
    }

    pub fn signal(&self, key: &str) -> Option<&Value> {
        self.signals.get(key)
    }

    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    pub fn is_veto(&self) -> bool {
        self.verdict == Verdict::NoTrade
    }
}

/// Wire shape of [`AgentOutput`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentOutputRecord {
    agent: String,
    action: Option<Action>,
    direction: Option<Side>,
    score: f64,
    reason: String,
    #[serde(default)]
    signals: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Value>,
}

impl TryFrom<AgentOutputRecord> for AgentOutput {
    type Error = Error;

    fn try_from(record: AgentOutputRecord) -> Result<Self, Self::Error> {
        let verdict = Verdict::from_parts(record.action, record.direction)?;
        let mut out = Self::build(&record.agent, verdict, record.score, &record.reason);
        out.signals = record.signals;
        out.raw = record.raw;
        Ok(out)
    }
}

impl From<AgentOutput> for AgentOutputRecord {
    fn from(out: AgentOutput) -> Self {
        Self {
            action: out.verdict.action(),
            direction: out.verdict.direction(),
            agent: out.agent,
            score: out.score,
            reason: out.reason,
            signals: out.signals,
            raw: out.raw,
        }
    }
}

// ── Final recommendation ──────────────────────────────────────────────

/// The aggregated answer for one evaluation. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecommendationRecord", into = "RecommendationRecord")]
pub struct Recommendation {
    direction: Option<Side>,
    confidence: f64,
    explanation: String,
    agents: Vec<AgentOutput>,
}

impl Recommendation {
    pub fn buy(
        side: Side,
        confidence: f64,
        explanation: impl AsRef<str>,
        agents: Vec<AgentOutput>,
    ) -> Self {
        Self::build(Some(side), confidence, explanation, agents)
    }

    pub fn no_trade(confidence: f64, explanation: impl AsRef<str>, agents: Vec<AgentOutput>) -> Self {
        Self::build(None, confidence, explanation, agents)
    }

    fn build(
        direction: Option<Side>,
        confidence: f64,
        explanation: impl AsRef<str>,
        agents: Vec<AgentOutput>,
    ) -> Self {
        Self {
            direction,
            confidence: clamp01(confidence),
            explanation: shorten(explanation.as_ref(), MAX_EXPLANATION_CHARS),
            agents,
        }
    }

    pub fn action(&self) -> Action {
        if self.direction.is_some() {
            Action::Buy
        } else {
            Action::NoTrade
        }
    }

    pub fn direction(&self) -> Option<Side> {
        self.direction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn agents(&self) -> &[AgentOutput] {
        &self.agents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecommendationRecord {
    action: Action,
    direction: Option<Side>,
    confidence: f64,
    explanation: String,
    agents: Vec<AgentOutput>,
}

impl TryFrom<RecommendationRecord> for Recommendation {
    type Error = Error;

    fn try_from(record: RecommendationRecord) -> Result<Self, Self::Error> {
        match (record.action, record.direction) {
            (Action::Buy, None) => Err(Error::InvalidAgentOutput(
                "BUY recommendation requires a direction".into(),
            )),
            (Action::NoTrade, Some(_)) => Err(Error::InvalidAgentOutput(
                "NO_TRADE recommendation cannot carry a direction".into(),
            )),
            (_, direction) => Ok(Self::build(
                direction,
                record.confidence,
                &record.explanation,
                record.agents,
            )),
        }
    }
}

impl From<Recommendation> for RecommendationRecord {
    fn from(rec: Recommendation) -> Self {
        Self {
            action: rec.action(),
            direction: rec.direction,
            confidence: rec.confidence,
            explanation: rec.explanation,
            agents: rec.agents,
        }
    }
}

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buy_carries_direction_and_other_verdicts_do_not() {
        let buy = AgentOutput::buy("TrendCandlesAgent", Side::Yes, 0.7, "Uptrend");
        assert_eq!(buy.action(), Some(Action::Buy));
        assert_eq!(buy.direction(), Some(Side::Yes));

        let veto = AgentOutput::no_trade("RiskAgent", 0.0, "Spreads are very wide");
        assert_eq!(veto.action(), Some(Action::NoTrade));
        assert_eq!(veto.direction(), None);
        assert!(veto.is_veto());

        let abstain = AgentOutput::abstain("PricingBaselineAgent", 0.2, "equal asks");
        assert_eq!(abstain.action(), None);
        assert_eq!(abstain.direction(), None);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(AgentOutput::abstain("a", 1.7, "").score(), 1.0);
        assert_eq!(AgentOutput::abstain("a", -0.3, "").score(), 0.0);
        assert_eq!(AgentOutput::abstain("a", f64::NAN, "").score(), 0.0);
    }

    #[test]
    fn reason_is_bounded() {
        let long = "x".repeat(MAX_REASON_CHARS * 2);
        let out = AgentOutput::abstain("a", 0.5, long);
        assert_eq!(out.reason().chars().count(), MAX_REASON_CHARS);
    }

    #[test]
    fn wire_shape_uses_uppercase_vocabulary() {
        let out = AgentOutput::buy("PricingBaselineAgent", Side::No, 0.5, "NO is cheaper")
            .with_signals(json!({"gap": 0.04}));
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["action"], "BUY");
        assert_eq!(value["direction"], "NO");
        assert_eq!(value["signals"]["gap"], 0.04);
        assert!(value.get("raw").is_none());
    }

    #[test]
    fn deserialization_rejects_direction_without_buy() {
        let bad = json!({
            "agent": "RulesAgent",
            "action": "NO_TRADE",
            "direction": "YES",
            "score": 0.1,
            "reason": "ambiguous"
        });
        assert!(serde_json::from_value::<AgentOutput>(bad).is_err());

        let bad_buy = json!({
            "agent": "TrendCandlesAgent",
            "action": "BUY",
            "direction": null,
            "score": 0.8,
            "reason": "uptrend"
        });
        assert!(serde_json::from_value::<AgentOutput>(bad_buy).is_err());
    }

    #[test]
    fn recommendation_action_follows_direction() {
        let rec = Recommendation::buy(Side::Yes, 0.4, "fallback", vec![]);
        assert_eq!(rec.action(), Action::Buy);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["action"], "BUY");
        assert_eq!(value["direction"], "YES");

        let rec = Recommendation::no_trade(2.0, "veto", vec![]);
        assert_eq!(rec.action(), Action::NoTrade);
        assert_eq!(rec.confidence(), 1.0);
    }
}
