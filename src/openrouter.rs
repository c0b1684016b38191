use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::LlmConfig;
use crate::error::{Error, FailureKind};

/// Seam between the pipeline and the model provider. One prompt in, raw
/// untrusted text out; all structure is imposed by the caller.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, Error>;
}

/// OpenRouter-backed chat completion client.
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn demo_completion(prompt: &str) -> String {
        // Keyed off the schema embedded in the prompt so both stages get a
        // shape-valid reply without a network call.
        if prompt.contains("\"svg_code\"") {
            json!({
                "svg_code": "<svg viewBox='0 0 800 400' xmlns='http://www.w3.org/2000/svg'><title>Demo diagram</title><desc>Placeholder produced in demo mode</desc><rect width='800' height='400' fill='#1e293b'/><circle cx='400' cy='200' r='80' fill='#facc15'><animate attributeName='r' values='80;90;80' dur='3s' repeatCount='indefinite'/></circle><text x='400' y='360' fill='white' text-anchor='middle'>demo mode</text></svg>"
            })
            .to_string()
        } else {
            json!({
                "explanation": "Demo mode explanation: this placeholder stands in for a real model response and describes the physical mechanism behind the question in enough detail to pass validation.",
                "related_phenomena": ["Demo phenomenon one", "Demo phenomenon two", "Demo phenomenon three"],
                "further_questions": ["Why does this happen?", "What else behaves like this?", "Where is this used?"]
            })
            .to_string()
        }
    }
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, Error> {
        if self.config.is_demo() {
            info!("Using demo mode - no model call performed");
            return Ok(Self::demo_completion(prompt));
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "temperature": temperature,
            "messages": [{ "role": "user", "content": prompt }]
        });

        info!(model = %self.config.model, prompt_len = prompt.len(), "📤 Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { FailureKind::Timeout } else { FailureKind::Network };
                Error::generation(kind, e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::generation(FailureKind::Network, e.to_string()))?;

        if !status.is_success() {
            error!("❌ Provider returned status {}: {}", status, preview(&text));
            return Err(Error::generation(
                FailureKind::Network,
                format!("status={status} body={}", preview(&text)),
            ));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::generation(FailureKind::Parse, format!("provider response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                Error::generation(FailureKind::Parse, "no message content in provider response")
            })?;

        info!(chars = content.len(), "📥 Completion received: {}", preview(&content));
        Ok(content)
    }
}

/// Truncates long payloads (raw completions, SVG code) for log lines.
pub fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() > LIMIT {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...[{} chars total]", head, text.chars().count())
    } else {
        text.to_string()
    }
}

// --- Response parsing helpers ---

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}
