//! LLM integration.
//!
//! One provider trait with a request/response shape small enough for the two
//! calls the pipeline makes: a text completion for the daily report and a
//! vision completion for medical images. [`AnthropicProvider`] talks to the
//! Messages API over reqwest.

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LlmError;

/// Default model when `HEALTH_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default output budget for one completion.
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Returns `None` if `ANTHROPIC_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let model = std::env::var("HEALTH_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self {
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One part of a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image { media_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    /// A user turn carrying an image followed by a text prompt.
    pub fn user_with_image(media_type: &str, data: Vec<u8>, text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Image {
                    media_type: media_type.to_string(),
                    data,
                },
                ContentPart::Text(text.into()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// An LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Single-turn text generation.
    async fn generate(&self, system: &str, context: &str) -> Result<String, LlmError> {
        let response = self
            .complete(CompletionRequest {
                system: Some(system.to_string()),
                messages: vec![ChatMessage::user(context)],
                max_tokens: DEFAULT_MAX_TOKENS,
            })
            .await?;
        Ok(response.content)
    }

    /// Single-turn vision analysis.
    async fn analyze_image(
        &self,
        system: &str,
        prompt: &str,
        media_type: &str,
        image: Vec<u8>,
    ) -> Result<String, LlmError> {
        let response = self
            .complete(CompletionRequest {
                system: Some(system.to_string()),
                messages: vec![ChatMessage::user_with_image(media_type, image, prompt)],
                max_tokens: DEFAULT_MAX_TOKENS,
            })
            .await?;
        Ok(response.content)
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = AnthropicProvider::new(config)?;
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(provider))
}
