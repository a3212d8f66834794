pub mod context;
pub mod memory;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::ProviderError;
use crate::provider::LlmProvider;
use crate::tool::{extract_tool_call, Dispatcher, ToolOutcome};
use crate::types::Message;

pub use context::ContextBuilder;
pub use memory::ConversationMemory;

/// What the agent produced for one user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// The model answered in plain text.
    Answer(String),
    /// The model asked for a tool and it was dispatched.
    Tool { action: String, outcome: ToolOutcome },
}

impl AgentReply {
    /// Text to show the user.
    pub fn text(&self) -> &str {
        match self {
            AgentReply::Answer(s) => s,
            AgentReply::Tool { outcome, .. } => outcome.text(),
        }
    }
}

/// Runs input → completion → extraction → dispatch.
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    dispatcher: Arc<Dispatcher>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_history: usize,
    system_prompt: String,
}

impl Agent {
    pub fn new(provider: Arc<dyn LlmProvider>, dispatcher: Arc<Dispatcher>, config: &AgentConfig) -> Self {
        let system_prompt = ContextBuilder::new(dispatcher.tools()).build_system_prompt();
        let model = if config.model.is_empty() {
            provider.default_model().to_string()
        } else {
            config.model.clone()
        };

        Self {
            provider,
            dispatcher,
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_history: config.max_history,
            system_prompt,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Fresh memory seeded with the system prompt.
    pub fn new_memory(&self) -> ConversationMemory {
        ConversationMemory::new(self.system_prompt.clone(), self.max_history)
    }

    /// Process one user turn. Provider failures are recorded in `memory`
    /// and returned; tool failures are part of the reply.
    pub async fn respond(
        &self,
        memory: &mut ConversationMemory,
        input: &str,
    ) -> Result<AgentReply, ProviderError> {
        memory.push(Message::user(input));

        let content = match self.complete(memory).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Completion failed: {}", e);
                memory.push_error(&e);
                return Err(e);
            }
        };
        memory.push(Message::assistant(content.clone()));

        let Some(invocation) = extract_tool_call(&content) else {
            debug!("Plain answer ({} chars)", content.chars().count());
            return Ok(AgentReply::Answer(content));
        };

        info!("Tool call: {}", invocation.action);
        let outcome = self.dispatcher.dispatch_invocation(&invocation).await;
        memory.push(Message::system(format!(
            "Result of {}: {}",
            invocation.action,
            outcome.text()
        )));

        Ok(AgentReply::Tool {
            action: invocation.action,
            outcome,
        })
    }

    async fn complete(&self, memory: &ConversationMemory) -> Result<String, ProviderError> {
        let resp = self
            .provider
            .chat(&memory.messages(), &self.model, self.max_tokens, self.temperature)
            .await?;
        debug!(
            "Completion used {} tokens ({} prompt, {} completion)",
            resp.usage.total_tokens, resp.usage.prompt_tokens, resp.usage.completion_tokens
        );

        match resp.content {
            Some(c) if !c.trim().is_empty() => Ok(c),
            _ => Err(ProviderError::Parse("model returned an empty reply".to_string())),
        }
    }
}
