use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod executor;
pub mod openai;
pub mod planner;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
    fn model(&self) -> &str;
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("valid fence regex")
    })
}

/// Body of the first fenced block, or the whole text when there is none.
pub fn strip_fences(text: &str) -> &str {
    match fence_re().captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => text.trim(),
    }
}

/// Parse a JSON object from a model reply, tolerating code fences and prose
/// around the object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let body = strip_fences(text);
    if let Ok(v @ serde_json::Value::Object(_)) = serde_json::from_str(body) {
        return Some(v);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&body[start..=end]) {
        Ok(v @ serde_json::Value::Object(_)) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_survives_fences_and_prose() {
        let fenced = "```json\n{\"steps\": [1]}\n```";
        assert_eq!(extract_json_object(fenced), Some(serde_json::json!({"steps": [1]})));

        let chatty = "Here is the plan: {\"steps\": []} hope it helps";
        assert_eq!(extract_json_object(chatty), Some(serde_json::json!({"steps": []})));

        assert_eq!(extract_json_object("[1, 2]"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn strip_fences_takes_first_block() {
        let text = "intro\n```python\nprint('PASS')\n```\nmore\n```\nother\n```";
        assert_eq!(strip_fences(text), "print('PASS')");
        assert_eq!(strip_fences("  print(1) "), "print(1)");
    }
}
