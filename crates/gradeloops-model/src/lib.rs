mod openai;
mod traits;

pub mod fakes;

pub use openai::{
    OpenAiClient, OpenAiConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL,
    DEFAULT_TIMEOUT_SECS,
};
pub use traits::{ChatMessage, InvokeOptions, ModelClient, ModelError, Role};

/// Create the default model client from configuration
pub fn create_client(config: OpenAiConfig) -> Result<Box<dyn ModelClient>, ModelError> {
    Ok(Box::new(OpenAiClient::new(config)?))
}
