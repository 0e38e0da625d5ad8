//! Token estimation

use recall_protocol::Message;

/// Maps a message to an approximate token cost.
///
/// Estimates only need to be consistent for a given message; they are not
/// expected to match a provider tokenizer.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, message: &Message) -> usize;

    fn estimate_all(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate(m)).sum()
    }
}

/// Character-based estimate (~4 chars per token plus framing overhead)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharEstimator {
    chars_per_token: usize,
    message_overhead: usize,
}

impl CharEstimator {
    pub fn new(chars_per_token: usize, message_overhead: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            message_overhead,
        }
    }
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl TokenEstimator for CharEstimator {
    fn estimate(&self, message: &Message) -> usize {
        message.estimate_chars().div_ceil(self.chars_per_token) + self.message_overhead
    }
}

/// Flat cost per message regardless of content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerMessageEstimator(pub usize);

impl TokenEstimator for PerMessageEstimator {
    fn estimate(&self, _message: &Message) -> usize {
        self.0
    }
}
