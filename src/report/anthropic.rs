use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ANTHROPIC_API_URL, GENERATOR_MAX_TOKENS};
use crate::error::{AppError, Result};
use crate::report::prompt::{build_prompt, parse_report};
use crate::report::{GeneratedReport, ReportGenerator};
use crate::types::{Anomaly, MarketSnapshot};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Anthropic Messages API client.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicGenerator {
    pub fn new(cfg: &Config, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.generator_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: cfg.anthropic_model.clone(),
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: GENERATOR_MAX_TOKENS,
            messages: [Message { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AppError::Generation(format!("Anthropic API error ({status}): {message}")));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        parsed
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .ok_or_else(|| AppError::Generation("unexpected response format from Anthropic".to_string()))
    }
}

#[async_trait]
impl ReportGenerator for AnthropicGenerator {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(
        &self,
        snapshot: &MarketSnapshot,
        anomalies: &[Anomaly],
        reasons: &[String],
    ) -> Result<GeneratedReport> {
        let prompt = build_prompt(snapshot, anomalies, reasons);
        let text = self.complete(&prompt).await?;
        Ok(parse_report(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_matches_messages_api_shape() {
        let req = MessagesRequest {
            model: "claude-test",
            max_tokens: 10,
            messages: [Message { role: "user", content: "hi" }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "model": "claude-test",
                "max_tokens": 10,
                "messages": [{ "role": "user", "content": "hi" }]
            })
        );
    }

    #[test]
    fn response_text_block_decodes() {
        let body = r#"{"id":"x","type":"message","content":[{"type":"text","text":"HEADLINE: A"}],"usage":{"input_tokens":1,"output_tokens":2}}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("HEADLINE: A"));
    }
}
