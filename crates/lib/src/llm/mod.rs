//! LLM abstraction and the Gemini client.
//!
//! Callers send a system prompt and a user prompt and get a JSON object back. Model output is parsed
//! leniently: code fences and chatter around the outermost object are ignored.

mod gemini;
pub mod prompts;

use async_trait::async_trait;

use crate::services::ServiceError;

pub use gemini::GeminiClient;

/// JSON-in/JSON-out completion.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, ServiceError>;
}

/// Parse model output that should contain one JSON object.
pub fn parse_json_lenient(text: &str) -> Result<serde_json::Value, ServiceError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Ok(v);
        }
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&trimmed[s..=e])
            .map_err(|err| ServiceError::Malformed(format!("model output is not json: {}", err))),
        _ => Err(ServiceError::Malformed(
            "model output has no json object".to_string(),
        )),
    }
}

/// Read a string field of a completion, treating missing or null as empty.
pub fn str_field(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_accepted() {
        let v = parse_json_lenient("```json\n{\"english\": \"hi\", \"korean\": \"안녕\"}\n```").unwrap();
        assert_eq!(str_field(&v, "korean"), "안녕");
        assert_eq!(str_field(&v, "missing"), "");
    }

    #[test]
    fn prose_without_object_is_malformed() {
        assert!(matches!(
            parse_json_lenient("sorry, I can't"),
            Err(ServiceError::Malformed(_))
        ));
    }
}
