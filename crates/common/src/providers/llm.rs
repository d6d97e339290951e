//! Language model abstraction
//!
//! Provides a unified interface for chat completion providers:
//! - OpenRouter (OpenAI-compatible chat completions API)
//! - Mock (scripted replies, used in tests)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::errors::{AppError, Result};

/// What one completion call produced.
///
/// An empty or whitespace-only reply is its own outcome rather than an
/// empty string, so callers cannot mistake it for an answer. Transport
/// and API failures surface as errors, not outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The model produced answer text
    Answered(String),
    /// The model returned nothing usable
    Empty,
}

/// Trait for chat completion
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Run one completion over the prompt
    async fn complete(&self, prompt: &str) -> Result<CompletionOutcome>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenRouter chat completion client
pub struct OpenRouterModel {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageContent,
}

#[derive(Deserialize)]
struct ChatMessageContent {
    #[serde(default)]
    content: String,
}

impl OpenRouterModel {
    /// Create a new OpenRouter client
    pub fn new(api_key: String, config: &ModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl CompletionModel for OpenRouterModel {
    async fn complete(&self, prompt: &str) -> Result<CompletionOutcome> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Model {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Model {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::Model {
            message: format!("Failed to parse response: {}", e),
        })?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Model {
                message: "Response contained no choices".to_string(),
            })?;

        if content.trim().is_empty() {
            Ok(CompletionOutcome::Empty)
        } else {
            Ok(CompletionOutcome::Answered(content))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock model for testing
pub struct MockModel {
    reply: String,
    fail: bool,
}

impl MockModel {
    /// Always answer with the given text
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
        }
    }

    /// Always return an empty completion
    pub fn empty() -> Self {
        Self {
            reply: String::new(),
            fail: false,
        }
    }

    /// Always fail with a model error
    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl CompletionModel for MockModel {
    async fn complete(&self, _prompt: &str) -> Result<CompletionOutcome> {
        if self.fail {
            return Err(AppError::Model {
                message: "Mock model failure".to_string(),
            });
        }
        if self.reply.trim().is_empty() {
            Ok(CompletionOutcome::Empty)
        } else {
            Ok(CompletionOutcome::Answered(self.reply.clone()))
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Create a completion model based on configuration.
///
/// Without an API key the capability is disabled; the pipeline then
/// serves deterministic fallback answers instead of model output.
pub fn create_model(config: &ModelConfig) -> Option<Arc<dyn CompletionModel>> {
    match config.api_key.clone() {
        Some(key) => Some(Arc::new(OpenRouterModel::new(key, config))),
        None => {
            tracing::info!("No model API key configured, answer generation disabled");
            None
        }
    }
}
