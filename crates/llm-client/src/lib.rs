pub mod client;
pub mod parse;
pub mod types;

pub use client::{LlmClient, OfflineReasoning, ReasoningService};
pub use parse::{consult, extract_json_object, from_schema};
pub use types::{system_prompt_with_schema, Prompt, Reasoned, ReasoningError};
