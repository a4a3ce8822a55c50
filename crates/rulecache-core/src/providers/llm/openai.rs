use super::{ChatMessage, LlmClient, LlmResponse};
use async_trait::async_trait;
use serde_json::json;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIClient {
    pub model: String,
    /// Absent key is reported per call, never at construction.
    pub api_key: Option<String>,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: Option<String>) -> Self {
        Self {
            model,
            api_key,
            base_url: CHAT_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: String) -> Self {
        let key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(model, key)
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LlmResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("OPENAI_API_KEY is not set");
        };

        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: self.model.clone(),
            meta: json!({ "usage": json.get("usage").cloned().unwrap_or_default() }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_an_error_not_a_panic() {
        let client = OpenAIClient::new("gpt-4.1-mini".into(), None);
        let err = client
            .chat(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
