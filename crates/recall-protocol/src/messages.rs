//! Message types for the conversation transcript

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Reasons a message is rejected before it reaches the transcript
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("tool_calls are only allowed on assistant messages, found on {0}")]
    UnexpectedToolCalls(Role),

    #[error("tool_call_id is only allowed on tool messages, found on {0}")]
    UnexpectedToolCallId(Role),

    #[error("tool message is missing tool_call_id")]
    MissingToolCallId,

    #[error("tool call id must not be empty")]
    EmptyToolCallId,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Parse a message from its JSON wire shape.
    ///
    /// A missing or unknown `role` is reported as [`MessageError::Malformed`].
    /// The parsed message is also structurally validated.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let message: Message =
            serde_json::from_value(value).map_err(|e| MessageError::Malformed(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Check the role-dependent shape of the message.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.tool_calls.is_some() && self.role != Role::Assistant {
            return Err(MessageError::UnexpectedToolCalls(self.role));
        }

        if let Some(calls) = &self.tool_calls {
            if calls.iter().any(|c| c.id.is_empty()) {
                return Err(MessageError::EmptyToolCallId);
            }
        }

        match (&self.tool_call_id, self.role) {
            (Some(id), Role::Tool) if id.is_empty() => Err(MessageError::EmptyToolCallId),
            (Some(_), Role::Tool) => Ok(()),
            (None, Role::Tool) => Err(MessageError::MissingToolCallId),
            (Some(_), role) => Err(MessageError::UnexpectedToolCallId(role)),
            (None, _) => Ok(()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Ids of the tool calls this message issues
    pub fn call_ids(&self) -> impl Iterator<Item = &str> {
        self.tool_calls
            .iter()
            .flatten()
            .map(|call| call.id.as_str())
    }

    /// Id of the tool call this message answers, for tool messages
    pub fn answered_call_id(&self) -> Option<&str> {
        match self.role {
            Role::Tool => self.tool_call_id.as_deref(),
            _ => None,
        }
    }

    /// Number of characters a token estimator should account for
    pub fn estimate_chars(&self) -> usize {
        let content = self.content.as_ref().map_or(0, |s| s.len());
        let calls: usize = self
            .tool_calls
            .iter()
            .flatten()
            .map(|c| c.estimate_chars())
            .sum();
        content + calls
    }
}

/// A tool invocation issued by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    fn estimate_chars(&self) -> usize {
        self.tool_name.len() + self.arguments.to_string().len()
    }
}
