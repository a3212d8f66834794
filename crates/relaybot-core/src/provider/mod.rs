pub mod openai_compat;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::ProviderError;
use crate::types::{CompletionResponse, Message};

/// Trait for chat-completion providers.
///
/// Only the reply text is relied upon; tool instructions travel inside it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Create the provider described by the agent config.
pub fn create_provider(config: &AgentConfig) -> Result<Box<dyn LlmProvider>, ProviderError> {
    if config.api_key.trim().is_empty() {
        return Err(ProviderError::NoApiKey);
    }
    Ok(Box::new(openai_compat::OpenAiCompatProvider::new(
        config.api_key.trim().to_string(),
        config.api_base.clone(),
        config.model.clone(),
        Duration::from_secs(config.timeout_secs),
    )))
}
