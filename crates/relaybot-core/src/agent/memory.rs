use std::collections::VecDeque;

use crate::types::Message;

/// System prompt plus a bounded, oldest-first message history.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    system_prompt: String,
    history: VecDeque<Message>,
    max_history: usize,
}

impl ConversationMemory {
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    /// Append a message, dropping the oldest once the bound is exceeded.
    pub fn push(&mut self, msg: Message) {
        self.history.push_back(msg);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Record a processing failure as a system note.
    pub fn push_error(&mut self, error: impl std::fmt::Display) {
        self.push(Message::system(format!("Error: {error}")));
    }

    /// Messages to send to the model: system prompt first.
    pub fn messages(&self) -> Vec<Message> {
        std::iter::once(Message::system(self.system_prompt.clone()))
            .chain(self.history.iter().cloned())
            .collect()
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
