//! Message history storage

use recall_protocol::Message;

use crate::TokenEstimator;

/// Stores conversation history with a cached token estimate
#[derive(Debug, Default, Clone)]
pub struct MessageHistory {
    messages: Vec<Message>,
    estimated_tokens: usize,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>, estimator: &dyn TokenEstimator) -> Self {
        let estimated_tokens = estimator.estimate_all(&messages);
        Self {
            messages,
            estimated_tokens,
        }
    }

    pub fn push(&mut self, message: Message, tokens: usize) {
        self.messages.push(message);
        self.estimated_tokens += tokens;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.estimated_tokens = 0;
    }
}
