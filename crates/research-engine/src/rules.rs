//! Resolution-rules clarity gate backed by the reasoning service.
//!
//! Like the risk gate it never picks a side. Low clarity, any ambiguity flag,
//! or an unusable reasoning reply all end in a veto.

use std::sync::Arc;
use std::time::Duration;

use common::text::shorten;
use common::{AgentOutput, MarketContext};
use llm_client::{
    consult, from_schema, system_prompt_with_schema, Prompt, Reasoned, ReasoningError,
    ReasoningService,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const AGENT_NAME: &str = "RulesAgent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Clarity below this vetoes.
    pub clarity_threshold: f64,
    pub reasoning_timeout_ms: u64,
    /// Each rules text is cut to this many characters before prompting.
    pub max_rules_chars: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            clarity_threshold: 0.8,
            reasoning_timeout_ms: 20_000,
            max_rules_chars: 4_000,
        }
    }
}

/// What the reasoning service must return about the market's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RulesReading {
    /// Plain-language description of what resolves YES.
    #[serde(default)]
    pub yes_means: String,
    /// Plain-language description of what resolves NO.
    #[serde(default)]
    pub no_means: String,
    /// Short labels for anything that makes resolution unclear. Empty when clear.
    #[serde(default)]
    pub ambiguity_flags: Vec<String>,
    /// 0 (unusable) to 1 (unambiguous).
    pub clarity_score: f64,
    #[serde(default)]
    pub notes: String,
}

impl RulesReading {
    /// Safe reading substituted when the reply cannot be used.
    fn unusable(err: &ReasoningError) -> Self {
        let flag = match err {
            ReasoningError::NonJson(_) => "non_json_output".to_string(),
            other => other.code().to_lowercase(),
        };
        Self {
            yes_means: String::new(),
            no_means: String::new(),
            ambiguity_flags: vec![flag],
            clarity_score: 0.0,
            notes: shorten(&err.to_string(), 300),
        }
    }
}

/// Bounds on reply text that travels on in signals.
const MAX_READING_CHARS: usize = 500;
const MAX_FLAGS: usize = 10;
const MAX_FLAG_CHARS: usize = 80;

fn validate(value: serde_json::Value) -> Result<RulesReading, ReasoningError> {
    let mut reading: RulesReading = from_schema(value)?;
    if !reading.clarity_score.is_finite() {
        return Err(ReasoningError::SchemaViolation(
            "clarity_score is not a number".into(),
        ));
    }
    reading.clarity_score = reading.clarity_score.clamp(0.0, 1.0);
    reading.yes_means = shorten(&reading.yes_means, MAX_READING_CHARS);
    reading.no_means = shorten(&reading.no_means, MAX_READING_CHARS);
    reading.notes = shorten(&reading.notes, MAX_READING_CHARS);
    reading.ambiguity_flags = reading
        .ambiguity_flags
        .iter()
        .filter(|f| !f.trim().is_empty())
        .take(MAX_FLAGS)
        .map(|f| shorten(f, MAX_FLAG_CHARS))
        .collect();
    Ok(reading)
}

const ROLE: &str = "You are a prediction market rules analyst.
Given a market context JSON, describe what YES and NO mean, list any ambiguity in how the market resolves, and score how clear the rules are.
Use rules_primary/rules_secondary as truth. If NO isn't stated, infer the opposite of YES.";

pub struct RulesEvaluator {
    service: Arc<dyn ReasoningService>,
    config: RulesConfig,
}

impl RulesEvaluator {
    pub fn new(service: Arc<dyn ReasoningService>, config: RulesConfig) -> Self {
        Self { service, config }
    }

    /// Only the fields needed to read the rules go into the prompt.
    fn build_prompt(&self, ctx: &MarketContext) -> Prompt {
        let cap = |s: &Option<String>| s.as_deref().map(|t| shorten(t, self.config.max_rules_chars));
        let payload = json!({
            "ticker": ctx.ticker,
            "title": ctx.title,
            "subtitle": ctx.subtitle,
            "rules_primary": cap(&ctx.rules_primary),
            "rules_secondary": cap(&ctx.rules_secondary),
            "yes_label": ctx.yes_label,
            "no_label": ctx.no_label,
            "strike_type": ctx.strike_type,
            "custom_strike": ctx.custom_strike,
        });
        let user = format!(
            "Market context JSON:\n{}\n\nReturn STRICT JSON only.",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );
        Prompt::new(
            "rules",
            system_prompt_with_schema::<RulesReading>(ROLE),
            user,
        )
    }

    pub async fn evaluate(&self, ctx: &MarketContext) -> AgentOutput {
        let prompt = self.build_prompt(ctx);
        let timeout = Duration::from_millis(self.config.reasoning_timeout_ms);

        let (reading, fallback) =
            match consult(self.service.as_ref(), &prompt, timeout, validate).await {
                Reasoned::Parsed(reading) => (reading, None),
                Reasoned::Fallback(err) => (RulesReading::unusable(&err), Some(err.code())),
            };

        let clarity = reading.clarity_score;
        let veto = clarity < self.config.clarity_threshold || !reading.ambiguity_flags.is_empty();
        debug!(clarity, veto, "rules reading");

        let signals = json!({
            "yes_means": reading.yes_means,
            "no_means": reading.no_means,
            "ambiguity_flags": reading.ambiguity_flags,
            "notes": reading.notes,
            "clarity_threshold": self.config.clarity_threshold,
            "fallback": fallback,
        });
        let raw = serde_json::to_value(&reading).unwrap_or_default();

        let out = if veto {
            AgentOutput::no_trade(
                AGENT_NAME,
                clarity,
                format!(
                    "Ambiguity/low clarity: [{}] (score={:.2})",
                    reading.ambiguity_flags.join(", "),
                    clarity
                ),
            )
        } else {
            AgentOutput::abstain(AGENT_NAME, clarity, "Rules are clear.")
        };
        out.with_signals(signals).with_raw(raw)
    }
}
