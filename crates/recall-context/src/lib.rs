//! Recall Context - Conversation context store
//!
//! This crate holds the conversation transcript for a session and produces
//! bounded views of it for model requests:
//! - Append-only message history with an incrementally maintained token estimate
//! - Budget resolution from an explicit value, model limits, or a default
//! - Read-time compaction (truncation, summarization, importance ranking)
//!   that never splits a tool call from its result
//! - Optional JSONL transcript persistence for session resume

mod budget;
mod compact;
mod error;
mod estimator;
mod history;
mod importance;
mod monitor;
mod store;
mod summarize;
mod transcript;
mod truncate;

pub use budget::{
    BudgetOrigin, BudgetPolicy, BudgetSource, BudgetUnavailable, ModelInfo, ResolvedBudget,
    DEFAULT_SAFETY_MARGIN,
};
pub use compact::{CompactionResult, CompactionStrategy};
pub use error::ContextError;
pub use estimator::{CharEstimator, PerMessageEstimator, TokenEstimator};
pub use history::MessageHistory;
pub use importance::ImportanceWeights;
pub use monitor::TokenMonitor;
pub use store::{ContextStore, RequestOptions, RequestView, StoreState};
pub use summarize::{render_transcript, Summarizer, SummarizeError, SUMMARY_PREFIX};
pub use transcript::{SessionMeta, TranscriptFile};

pub use recall_protocol::{Message, MessageError, Role, ToolCall};
