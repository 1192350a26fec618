use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, GENERATOR_MAX_TOKENS, OPENAI_API_URL};
use crate::error::{AppError, Result};
use crate::report::prompt::{build_prompt, parse_report};
use crate::report::{GeneratedReport, ReportGenerator};
use crate::types::{Anomaly, MarketSnapshot};

const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI chat completions client.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiGenerator {
    pub fn new(cfg: &Config, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.generator_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: cfg.openai_model.clone(),
            endpoint: OPENAI_API_URL.to_string(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: GENERATOR_MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Generation(format!("OpenAI API error ({status}): {body}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Generation("OpenAI response had no content".to_string()))
    }
}

#[async_trait]
impl ReportGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
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
