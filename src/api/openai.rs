use super::{http_client, ChatService};
use crate::error::{IllustratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const TEMPERATURE: f64 = 0.8;
const TOP_P: f64 = 0.9;
const MAX_TOKENS: u32 = 100;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    api_base: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, api_base: &str, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model,
            client: http_client(timeout)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn request_body(model: &str, system: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": prompt }
        ],
        "temperature": TEMPERATURE,
        "top_p": TOP_P,
        "max_tokens": MAX_TOKENS
    })
}

/// First choice's message text, trimmed.
fn extract_content(response: &Value) -> Result<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IllustratorError::Upstream("chat completion returned no content".to_string()))
}

#[async_trait]
impl ChatService for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        info!("Requesting prompt from {}...", self.model);

        let body = request_body(&self.model, system, prompt);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IllustratorError::Upstream(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IllustratorError::Upstream(format!(
                "chat completion error (HTTP {}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            IllustratorError::Upstream(format!("malformed chat completion response: {e}"))
        })?;
        let text = extract_content(&response_json)?;

        debug!("Generated prompt: {}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_sampling_settings() {
        let body = request_body("gpt-4o-mini", "be brief", "a harbour at dusk");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"].as_f64(), Some(0.8));
        assert_eq!(body["top_p"].as_f64(), Some(0.9));
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "a harbour at dusk");
    }

    #[test]
    fn content_is_taken_from_first_choice() {
        let response = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Foggy pier, gas lamps.\n" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(extract_content(&response).unwrap(), "Foggy pier, gas lamps.");
    }

    #[test]
    fn missing_or_blank_content_is_an_upstream_error() {
        for response in [
            json!({ "choices": [] }),
            json!({ "choices": [{ "message": { "role": "assistant", "content": null } }] }),
            json!({ "choices": [{ "message": { "role": "assistant", "content": "  " } }] }),
            json!({ "error": { "message": "rate limited" } }),
        ] {
            assert!(matches!(
                extract_content(&response),
                Err(IllustratorError::Upstream(_))
            ));
        }
    }
}
