//! The one place agent outputs are serialized for the reasoning service.
//!
//! `raw` payloads are unbounded on the way in; here they are cut down so the
//! prompt stays within a fixed byte budget.

use common::{AgentOutput, MarketContext};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::types::AggregatorConfig;

/// Compact view of the market for the aggregation prompt.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub ticker: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub close_time: Option<String>,
    pub yes_ask: Option<f64>,
    pub no_ask: Option<f64>,
    pub yes_spread: Option<f64>,
    pub no_spread: Option<f64>,
    pub volume_24h: Option<i64>,
    pub open_interest: Option<i64>,
    pub semantics: Value,
}

impl MarketSnapshot {
    pub fn from_context(ctx: &MarketContext) -> Self {
        Self {
            ticker: ctx.ticker.clone(),
            title: ctx.title.clone(),
            status: ctx.status.clone(),
            close_time: ctx.close_time.clone(),
            yes_ask: ctx.yes_ask,
            no_ask: ctx.no_ask,
            yes_spread: ctx.yes_spread,
            no_spread: ctx.no_spread,
            volume_24h: ctx.volume_24h,
            open_interest: ctx.open_interest,
            semantics: json!({
                "yes_label": ctx.yes_label,
                "no_label": ctx.no_label,
                "strike_type": ctx.strike_type,
                "time_to_close_h": ctx.time_to_close_h,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptPayload {
    pub market_snapshot: MarketSnapshot,
    pub agents: Vec<Value>,
}

impl PromptPayload {
    pub fn build(ctx: &MarketContext, outputs: &[AgentOutput], cfg: &AggregatorConfig) -> Self {
        let agents: Vec<Value> = outputs.iter().map(|o| prune_agent(o, cfg)).collect();
        let mut payload = Self {
            market_snapshot: MarketSnapshot::from_context(ctx),
            agents,
        };

        if payload.byte_len() > cfg.max_payload_bytes {
            for agent in &mut payload.agents {
                if let Some(obj) = agent.as_object_mut() {
                    obj.remove("raw");
                }
            }
        }
        payload
    }

    pub fn byte_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn prune_agent(output: &AgentOutput, cfg: &AggregatorConfig) -> Value {
    let mut value = serde_json::to_value(output).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        if let Some(raw) = obj.remove("raw") {
            obj.insert("raw".into(), prune_raw(raw, cfg));
        }
    }
    value
}

fn prune_raw(raw: Value, cfg: &AggregatorConfig) -> Value {
    let raw = match raw {
        Value::Object(mut map) if map.get("articles").is_some_and(Value::is_array) => {
            if let Some(Value::Array(articles)) = map.remove("articles") {
                let kept: Vec<Value> = articles
                    .iter()
                    .take(cfg.max_prompt_articles)
                    .map(article_summary)
                    .collect();
                map.insert("articles".into(), Value::Array(kept));
            }
            Value::Object(map)
        }
        other => other,
    };

    let size = serde_json::to_vec(&raw).map(|v| v.len()).unwrap_or(0);
    if size > cfg.max_raw_bytes {
        Value::String(format!("<pruned {} bytes>", size))
    } else {
        raw
    }
}

fn article_summary(article: &Value) -> Value {
    let mut out = Map::new();
    for key in ["title", "source", "publishedAt", "url"] {
        out.insert(
            key.into(),
            article.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Side;

    fn ctx() -> MarketContext {
        MarketContext {
            ticker: Some("KXTEST-1".into()),
            title: Some("Test market".into()),
            yes_ask: Some(0.4),
            no_ask: Some(0.62),
            yes_label: Some("Duke".into()),
            rules_primary: Some("long rules text".into()),
            ..Default::default()
        }
    }

    fn news_output(n: usize) -> AgentOutput {
        let articles: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "title": format!("story {}", i),
                    "description": "desc",
                    "content": "body",
                    "url": format!("https://example.com/{}", i),
                    "publishedAt": "2026-03-01T00:00:00Z",
                    "source": "AP",
                })
            })
            .collect();
        AgentOutput::buy("NewsEvidenceAgent", Side::Yes, 0.3, "P(YES)≈0.65")
            .with_raw(json!({"articles": articles, "evidence": {"p_yes": 0.65}}))
    }

    #[test]
    fn articles_are_cut_to_summary_fields() {
        let payload = PromptPayload::build(&ctx(), &[news_output(9)], &AggregatorConfig::default());
        let raw = &payload.agents[0]["raw"];
        let articles = raw["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 6);
        assert_eq!(articles[0]["title"], "story 0");
        assert_eq!(articles[0]["publishedAt"], "2026-03-01T00:00:00Z");
        assert!(articles[0].get("content").is_none());
        assert!(articles[0].get("description").is_none());
        assert_eq!(raw["evidence"]["p_yes"], 0.65);
    }

    #[test]
    fn oversized_raw_is_replaced_with_marker() {
        let big = AgentOutput::abstain("RiskAgent", 0.9, "ok").with_raw(json!({"blob": "x".repeat(10_000)}));
        let payload = PromptPayload::build(&ctx(), &[big], &AggregatorConfig::default());
        let marker = payload.agents[0]["raw"].as_str().unwrap();
        assert!(marker.starts_with("<pruned "));
        assert!(marker.ends_with(" bytes>"));
    }

    #[test]
    fn payload_over_budget_drops_raw_everywhere() {
        let cfg = AggregatorConfig {
            max_payload_bytes: 500,
            ..Default::default()
        };
        let outputs = [
            news_output(3),
            AgentOutput::abstain("RiskAgent", 0.9, "ok").with_raw(json!({"checks": {}})),
        ];
        let payload = PromptPayload::build(&ctx(), &outputs, &cfg);
        for agent in &payload.agents {
            assert!(agent.get("raw").is_none());
            assert!(agent.get("reason").is_some());
        }
    }

    #[test]
    fn snapshot_carries_pricing_not_rules() {
        let payload = PromptPayload::build(&ctx(), &[], &AggregatorConfig::default());
        let json = payload.to_pretty_json();
        assert!(json.contains("\"no_ask\": 0.62"));
        assert!(json.contains("\"yes_label\": \"Duke\""));
        assert!(!json.contains("long rules text"));
    }
}
