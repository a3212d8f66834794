use serde::{Deserialize, Serialize};

/// Message role in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub usage: TokenUsage,
}

/// Token usage information.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Message received from a group-chat webhook.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub at_user_ids: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        conversation_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            conversation_id: conversation_id.into(),
            sender_id: String::new(),
            content: content.into(),
            at_user_ids: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Message to post back to the group chat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub content: String,
    pub at_user_ids: Vec<String>,
    pub at_mobiles: Vec<String>,
    pub is_at_all: bool,
}

impl OutboundMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Reply that mentions the given users.
    pub fn reply(content: impl Into<String>, at_user_ids: &[String]) -> Self {
        Self {
            content: content.into(),
            at_user_ids: at_user_ids.to_vec(),
            ..Default::default()
        }
    }
}
