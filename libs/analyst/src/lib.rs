//! Completion client used to turn a price snapshot into written analysis.
//!
//! Speaks the OpenAI chat-completions wire format, so any compatible
//! endpoint can be configured through `api_base`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub use reqwest::StatusCode;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("authentication with the completion service failed")]
    Authentication,

    #[error("completion service rate limited: {0}")]
    RateLimited(String),

    #[error("completion request failed with {status}: {body}")]
    RequestFailed { status: StatusCode, body: String },

    #[error("unexpected completion response: {0}")]
    UnexpectedResponse(String),
}

/// Stateless: every call is a fresh single-message conversation.
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

pub struct OpenAiAnalyst {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAnalyst {
    pub fn new(config: OpenAiConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl Analyst for OpenAiAnalyst {
    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_chars = prompt.chars().count()))]
    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&self.request(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::UnexpectedResponse(format!("failed to parse: {e}")))?;

        let text = first_choice_text(body)?;
        debug!(answer_chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

fn classify_failure(status: StatusCode, body: String) -> AnalysisError {
    match status {
        StatusCode::UNAUTHORIZED => AnalysisError::Authentication,
        StatusCode::TOO_MANY_REQUESTS => AnalysisError::RateLimited(body),
        _ => AnalysisError::RequestFailed { status, body },
    }
}

fn first_choice_text(body: ChatResponse) -> Result<String, AnalysisError> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AnalysisError::UnexpectedResponse(
            "no content in first choice".to_string(),
        ));
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
