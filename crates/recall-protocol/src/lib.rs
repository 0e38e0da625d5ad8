//! Recall Protocol - Shared message types for the context store
//!
//! This crate defines the conversation data model:
//! - Message and tool call types with their JSON wire shape
//! - Structural validation of incoming messages
//! - Tool-call/tool-result pairing helpers used by compaction

mod messages;
pub mod pairs;

pub use messages::*;
pub use pairs::Orphan;
