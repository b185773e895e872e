use common::{Action, Side};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub reasoning_timeout_ms: u64,
    /// Serialized prompt payload above this size is sent without any `raw`.
    pub max_payload_bytes: usize,
    /// A single `raw` value above this size is replaced with a marker.
    pub max_raw_bytes: usize,
    /// Articles kept per agent `raw` in the prompt.
    pub max_prompt_articles: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            reasoning_timeout_ms: 20_000,
            max_payload_bytes: 24_000,
            max_raw_bytes: 4_000,
            max_prompt_articles: 6,
        }
    }
}

/// Final call as the reasoning service must phrase it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateVerdict {
    /// "BUY" or "NO_TRADE".
    pub action: Action,
    /// "YES" or "NO" on BUY, null on NO_TRADE.
    pub direction: Option<Side>,
    /// 0..1
    pub confidence: f64,
    /// Short justification, at most 280 characters.
    pub explanation: String,
}
