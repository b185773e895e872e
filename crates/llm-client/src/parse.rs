//! Defensive handling of free-text reasoning output.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::client::ReasoningService;
use crate::types::{Prompt, Reasoned, ReasoningError};

/// Pull the JSON object out of model text.
///
/// Prompts ask for bare JSON, but replies occasionally arrive inside a code
/// fence or with a sentence around them.
pub fn extract_json_object(text: &str) -> Result<Value, ReasoningError> {
    let trimmed = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Value>(&trimmed[start..=end])
                .map_err(|e| ReasoningError::NonJson(e.to_string()))
        }
        _ => Err(ReasoningError::NonJson(preview(trimmed))),
    }
}

fn strip_code_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // drop the language tag line, if any
    let rest = match rest.find('\n') {
        Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        _ => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 120;
    let compact = text.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        format!("{}…", compact.chars().take(MAX_CHARS).collect::<String>())
    } else {
        compact
    }
}

/// Deserialize a JSON value into `T`, reporting mismatches as schema violations.
pub fn from_schema<T: DeserializeOwned>(value: Value) -> Result<T, ReasoningError> {
    if !value.is_object() {
        return Err(ReasoningError::SchemaViolation(
            "expected a JSON object".into(),
        ));
    }
    serde_json::from_value(value).map_err(|e| ReasoningError::SchemaViolation(e.to_string()))
}

/// Make exactly one bounded call to the reasoning service and validate the reply.
///
/// Timeouts, transport errors, non-JSON text and schema violations all land in
/// [`Reasoned::Fallback`]; nothing here returns an error to the caller.
pub async fn consult<T, F>(
    service: &dyn ReasoningService,
    prompt: &Prompt,
    timeout: Duration,
    validate: F,
) -> Reasoned<T>
where
    F: FnOnce(Value) -> Result<T, ReasoningError>,
{
    let outcome = match tokio::time::timeout(timeout, service.complete(prompt)).await {
        Err(_) => Err(ReasoningError::Timeout),
        Ok(result) => result,
    };

    let parsed = outcome
        .and_then(|text| extract_json_object(&text))
        .and_then(validate);

    match parsed {
        Ok(value) => Reasoned::Parsed(value),
        Err(err) => {
            warn!(
                purpose = prompt.purpose,
                request_id = %prompt.request_id,
                code = err.code(),
                "reasoning fallback: {}",
                err
            );
            Reasoned::Fallback(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        clarity_score: f64,
    }

    struct Canned(&'static str);

    #[async_trait]
    impl ReasoningService for Canned {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, ReasoningError> {
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningService for Slow {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, ReasoningError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".into())
        }
    }

    fn prompt() -> Prompt {
        Prompt::new("test", "system", "user")
    }

    #[test]
    fn extracts_bare_fenced_and_wrapped_objects() {
        let bare = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(bare["a"], 1);

        let fenced = extract_json_object("```json\n{\"a\": 2}\n```").unwrap();
        assert_eq!(fenced["a"], 2);

        let wrapped = extract_json_object("Sure! Here it is: {\"a\": 3} Hope that helps.").unwrap();
        assert_eq!(wrapped["a"], 3);
    }

    #[test]
    fn rejects_plain_text_and_truncated_json() {
        assert!(matches!(
            extract_json_object("I cannot answer that."),
            Err(ReasoningError::NonJson(_))
        ));
        assert!(matches!(
            extract_json_object(r#"{"action": "BUY", "direc"#),
            Err(ReasoningError::NonJson(_))
        ));
    }

    #[test]
    fn from_schema_reports_violations() {
        let ok: Reading = from_schema(serde_json::json!({"clarity_score": 0.9})).unwrap();
        assert_eq!(ok.clarity_score, 0.9);

        let err = from_schema::<Reading>(serde_json::json!({"clarity_score": "high"})).unwrap_err();
        assert!(matches!(err, ReasoningError::SchemaViolation(_)));

        let err = from_schema::<Reading>(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, ReasoningError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn consult_parses_valid_reply() {
        let out: Reasoned<Reading> = consult(
            &Canned(r#"{"clarity_score": 0.85}"#),
            &prompt(),
            Duration::from_secs(1),
            from_schema,
        )
        .await;
        match out {
            Reasoned::Parsed(reading) => assert_eq!(reading, Reading { clarity_score: 0.85 }),
            Reasoned::Fallback(err) => panic!("unexpected fallback: {}", err),
        }
    }

    #[tokio::test]
    async fn consult_falls_back_on_garbage() {
        let out: Reasoned<Reading> =
            consult(&Canned("not json"), &prompt(), Duration::from_secs(1), from_schema).await;
        assert!(matches!(out, Reasoned::Fallback(ReasoningError::NonJson(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn consult_falls_back_on_timeout() {
        let out: Reasoned<Reading> =
            consult(&Slow, &prompt(), Duration::from_millis(100), from_schema).await;
        assert!(matches!(out, Reasoned::Fallback(ReasoningError::Timeout)));
    }
}
