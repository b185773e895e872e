use std::path::Path;

use anyhow::Context;
use decision_engine::AggregatorConfig;
use kalshi_client::KalshiClientConfig;
use news_client::NewsClientConfig;
use research_engine::{NewsEvidenceConfig, RulesConfig};
use serde::Deserialize;
use signal_engine::{RiskConfig, TrendConfig};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub kalshi: KalshiClientConfig,
    pub llm: LlmConfig,
    pub news: NewsConfig,
    pub journal: JournalConfig,
    pub risk: RiskConfig,
    pub trend: TrendConfig,
    pub rules: RulesConfig,
    pub news_evidence: NewsEvidenceConfig,
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// HTTP timeout; each evaluator also bounds its own call.
    pub timeout_ms: u64,
    pub max_tokens: u32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-3-5-sonnet-latest".into(),
            timeout_ms: 30_000,
            max_tokens: 1_024,
            api_key_env: "ANTHROPIC_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_key_env: String,
    #[serde(flatten)]
    pub client: NewsClientConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key_env: "NEWSAPI_KEY".into(),
            client: NewsClientConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    /// Overridden by `ADVISOR_JOURNAL_DIR`.
    pub dir: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "journal".into(),
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file means all defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// A non-empty value of the variable named by `[llm].api_key_env`.
    pub fn llm_api_key(&self) -> Option<String> {
        non_empty_env(&self.llm.api_key_env)
    }

    pub fn news_api_key(&self) -> Option<String> {
        non_empty_env(&self.news.api_key_env)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
