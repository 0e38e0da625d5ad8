//! Compaction strategies for context management

use std::collections::BTreeSet;

use recall_config::StrategySettings;
use recall_protocol::{pairs, Message};
use serde::{Deserialize, Serialize};

/// Strategy for building a compacted view of the history
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompactionStrategy {
    /// Keep system messages and the newest messages that fit
    #[default]
    Truncate,
    /// Summarize older messages into a single system message
    Summarize {
        /// Number of recent non-system messages kept verbatim; derived from
        /// the budget when unset
        keep_recent: Option<usize>,
    },
    /// Keep the highest scoring messages that fit
    Importance,
}

impl CompactionStrategy {
    pub fn summarize() -> Self {
        Self::Summarize { keep_recent: None }
    }

    pub fn summarize_keeping(keep_recent: usize) -> Self {
        Self::Summarize {
            keep_recent: Some(keep_recent),
        }
    }

    pub fn requires_summarizer(&self) -> bool {
        matches!(self, Self::Summarize { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Truncate => "truncate",
            Self::Summarize { .. } => "summarize",
            Self::Importance => "importance",
        }
    }
}

impl From<&StrategySettings> for CompactionStrategy {
    fn from(settings: &StrategySettings) -> Self {
        match settings {
            StrategySettings::Truncate => Self::Truncate,
            StrategySettings::Summarize { keep_recent } => Self::Summarize {
                keep_recent: *keep_recent,
            },
            StrategySettings::Importance => Self::Importance,
        }
    }
}

/// Outcome of compacting one request view
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionResult {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub messages_before: usize,
    pub messages_after: usize,
    /// Strategy that produced the view, after any fallback
    pub strategy_used: &'static str,
    /// Set when the configured strategy could not run and truncation was used
    pub fell_back: bool,
}

impl CompactionResult {
    pub fn messages_removed(&self) -> usize {
        self.messages_before.saturating_sub(self.messages_after)
    }
}

/// Collect `indices` from `messages` in original order.
pub(crate) fn select(messages: &[Message], indices: &BTreeSet<usize>) -> Vec<Message> {
    indices.iter().map(|&idx| messages[idx].clone()).collect()
}

pub(crate) fn system_indices(messages: &[Message]) -> BTreeSet<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_system())
        .map(|(idx, _)| idx)
        .collect()
}

/// Smallest view compaction degrades to: system messages plus the most
/// recent non-system message together with its pair partners.
pub(crate) fn minimal_floor(messages: &[Message]) -> BTreeSet<usize> {
    let mut kept = system_indices(messages);
    if let Some(last) = messages.iter().rposition(|m| !m.is_system()) {
        kept.extend(pairs::pair_closure(messages, last));
    }
    kept
}

/// Last line of defense against views that split a tool pair.
///
/// Orphans already present in `history` (for example a call still awaiting
/// its result) are tolerated. Anything else is a bug in a strategy: debug
/// builds panic, release builds drop the offending messages.
pub(crate) fn enforce_pairs(history: &[Message], view: Vec<Message>) -> Vec<Message> {
    let baseline = pairs::find_orphans(history);
    let violations: Vec<_> = pairs::find_orphans(&view)
        .into_iter()
        .filter(|orphan| !baseline.contains(orphan))
        .collect();

    if violations.is_empty() {
        return view;
    }

    tracing::error!(?violations, "compacted view split a tool pair");
    debug_assert!(
        violations.is_empty(),
        "compacted view split a tool pair: {violations:?}"
    );
    pairs::drop_orphans(view, &baseline)
}
