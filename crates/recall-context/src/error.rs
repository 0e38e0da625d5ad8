//! Context error types

use std::path::PathBuf;

use recall_protocol::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    #[error("transcript I/O failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("corrupt transcript {path} at line {line}: {reason}")]
    CorruptTranscript {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}
