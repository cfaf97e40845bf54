use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while invoking a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("No API credential configured (set {0})")]
    AuthMissing(String),

    #[error("Model response was empty")]
    EmptyResponse,

    #[error("Model transport failure: {0}")]
    TransportFailure(String),
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request sampling options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvokeOptions {
    pub temperature: f32,
    /// Ask the provider for an object-only JSON response. This is a hint;
    /// callers still validate the returned text.
    pub strict_json: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            strict_json: false,
        }
    }
}

impl InvokeOptions {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            strict_json: false,
        }
    }

    pub fn with_strict_json(mut self) -> Self {
        self.strict_json = true;
        self
    }
}

/// The single seam between the loop and a completion provider.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller. They must be safe to share between concurrent cycles.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable provider name (e.g., "OpenAI")
    fn name(&self) -> &str;

    /// Model identifier sent to the provider
    fn model(&self) -> &str;

    /// Send the conversation and return the completion text
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, ModelError>;
}
