use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::clients::extract_error_message;
use crate::config::LlmConfig;
use crate::error::{AppError, Result};

/// A text model able to write captions.
#[async_trait]
pub trait CaptionModel: Send + Sync {
    /// Completes `prompt` under the `system` instructions.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `CaptionModel` over an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiChat {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiChat {
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl CaptionModel for OpenAiChat {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.8,
            max_tokens: 400,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(sonic_rs::to_string(&request)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Caption model returned {}: {}",
                status,
                extract_error_message(&body)
            )));
        }

        let parsed: ChatResponse = sonic_rs::from_slice(&body)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::Upstream("Caption model returned no content".to_string()))
    }
}
