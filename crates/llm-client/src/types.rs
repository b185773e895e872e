use schemars::JsonSchema;
use serde::Serialize;
use uuid::Uuid;

/// A domain-framed request to the reasoning service.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub request_id: Uuid,
    /// Short label for logs ("rules", "news_evidence", "aggregate", ...).
    pub purpose: &'static str,
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(purpose: &'static str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            purpose,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Build a system prompt that frames the role and pins the reply to the JSON schema of `T`.
pub fn system_prompt_with_schema<T: JsonSchema>(role: &str) -> String {
    let schema = schemars::schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"{}
You must output strictly valid JSON conforming to the schema below.
Do NOT output any markdown blocks or conversational text. JUST the JSON object.

JSON Schema:
{}
"#,
        role.trim_end(),
        schema_json
    )
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning request failed: {0}")]
    Transport(String),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("timeout")]
    Timeout,
    #[error("response was not JSON: {0}")]
    NonJson(String),
    #[error("schema validation failed: {0}")]
    SchemaViolation(String),
    #[error("reasoning service unavailable: {0}")]
    Unavailable(String),
}

impl ReasoningError {
    /// Stable code reported in agent signals and fallback explanations.
    pub fn code(&self) -> &'static str {
        match self {
            ReasoningError::Transport(_) => "REASONING_TRANSPORT_ERROR",
            ReasoningError::HttpStatus { .. } => "REASONING_HTTP_ERROR",
            ReasoningError::Timeout => "REASONING_TIMEOUT",
            ReasoningError::NonJson(_) => "REASONING_NON_JSON",
            ReasoningError::SchemaViolation(_) => "REASONING_SCHEMA_REJECT",
            ReasoningError::Unavailable(_) => "REASONING_UNAVAILABLE",
        }
    }
}

/// Outcome of one reasoning consultation: either a validated value or the
/// reason the caller must take its fallback branch.
#[derive(Debug)]
pub enum Reasoned<T> {
    Parsed(T),
    Fallback(ReasoningError),
}
