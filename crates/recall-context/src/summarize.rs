//! Summarization: replace older messages with a single summary message

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use recall_protocol::{pairs, Message};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::compact::system_indices;
use crate::TokenEstimator;

/// Marker at the start of every synthetic summary message
pub const SUMMARY_PREFIX: &str = "[Summary of earlier conversation]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    #[error("summarizer failed: {0}")]
    Failed(String),

    #[error("summarizer timed out after {0:?}")]
    TimedOut(Duration),

    #[error("summarization cancelled")]
    Cancelled,

    #[error("summarizer returned an empty summary")]
    Empty,

    #[error("nothing to summarize")]
    NothingToSummarize,

    #[error("summarized view needs {tokens} tokens, over the budget of {budget}")]
    Oversized { tokens: usize, budget: usize },
}

/// Condenses a run of messages into text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, SummarizeError>;
}

/// Split point and inputs for a summarization pass
pub(crate) struct SummaryPlan {
    /// First index of the verbatim suffix
    pub cut: usize,
    /// Non-system messages before `cut`
    pub to_summarize: Vec<Message>,
}

pub(crate) fn plan(
    messages: &[Message],
    estimator: &dyn TokenEstimator,
    budget: usize,
    keep_recent: Option<usize>,
) -> Result<SummaryPlan, SummarizeError> {
    let system = system_indices(messages);
    let non_system: Vec<usize> = (0..messages.len())
        .filter(|idx| !system.contains(idx))
        .collect();

    let naive = match keep_recent {
        Some(count) if count >= non_system.len() => 0,
        Some(0) => messages.len(),
        Some(count) => non_system[non_system.len() - count],
        None => budget_cut(messages, &non_system, estimator, budget, &system),
    };
    // The latest exchange always stays verbatim
    let latest = non_system
        .last()
        .and_then(|&last| pairs::pair_closure(messages, last).first().copied())
        .unwrap_or(messages.len());
    let cut = pairs::shift_cut_for_pairs(messages, naive.min(latest));

    let to_summarize: Vec<Message> = non_system
        .iter()
        .filter(|&&idx| idx < cut)
        .map(|&idx| messages[idx].clone())
        .collect();

    if to_summarize.is_empty() {
        return Err(SummarizeError::NothingToSummarize);
    }

    Ok(SummaryPlan { cut, to_summarize })
}

/// Suffix sized to half of the budget left after system messages
fn budget_cut(
    messages: &[Message],
    non_system: &[usize],
    estimator: &dyn TokenEstimator,
    budget: usize,
    system: &BTreeSet<usize>,
) -> usize {
    let system_tokens: usize = system.iter().map(|&idx| estimator.estimate(&messages[idx])).sum();
    let target = budget.saturating_sub(system_tokens) / 2;

    let mut cut = messages.len();
    let mut used = 0;
    for &idx in non_system.iter().rev() {
        let cost = estimator.estimate(&messages[idx]);
        if used + cost > target {
            break;
        }
        used += cost;
        cut = idx;
    }
    cut
}

/// Assemble the view: system messages from the summarized prefix, the
/// summary, then the verbatim suffix.
pub(crate) fn assemble(messages: &[Message], plan: &SummaryPlan, summary: &str) -> Vec<Message> {
    let mut view: Vec<Message> = messages[..plan.cut]
        .iter()
        .filter(|m| m.is_system())
        .cloned()
        .collect();
    view.push(Message::system(format!("{SUMMARY_PREFIX}\n\n{}", summary.trim())));
    view.extend_from_slice(&messages[plan.cut..]);
    view
}

/// Run the summarizer under a timeout, aborting early on cancellation.
pub(crate) async fn summarize_bounded(
    summarizer: &dyn Summarizer,
    messages: &[Message],
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<String, SummarizeError> {
    let call = tokio::time::timeout(timeout, summarizer.summarize(messages));

    let outcome = match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SummarizeError::Cancelled),
                outcome = call => outcome,
            }
        }
        None => call.await,
    };

    match outcome {
        Ok(Ok(summary)) if summary.trim().is_empty() => Err(SummarizeError::Empty),
        Ok(result) => result,
        Err(_) => Err(SummarizeError::TimedOut(timeout)),
    }
}

/// Plain-text rendering of messages, for summarizers that prompt a model
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let body = message.text().unwrap_or_default();
        out.push_str(&format!("{}: {}\n", message.role, body));
        for call in message.tool_calls.iter().flatten() {
            out.push_str(&format!(
                "  -> {}({}) [{}]\n",
                call.tool_name, call.arguments, call.id
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CharEstimator, PerMessageEstimator};
    use recall_protocol::ToolCall;
    use serde_json::json;

    struct StaticSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for StaticSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, SummarizeError> {
            Ok(self.0.to_string())
        }
    }

    struct SlowSummarizer;

    #[async_trait]
    impl Summarizer for SlowSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, SummarizeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }
    }

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("rules"),
            Message::user("read a"),
            Message::assistant_with_tool_calls(vec![ToolCall::new("c1", "read", json!({}))]),
            Message::tool_result("c1", "a"),
            Message::assistant("a read"),
            Message::user("thanks"),
        ]
    }

    #[test]
    fn test_plan_keep_recent_shifts_for_pairs() {
        let messages = conversation();
        // Keeping 3 would start at the tool result at index 3
        let plan = plan(&messages, &PerMessageEstimator(1), 100, Some(3)).unwrap();
        assert_eq!(plan.cut, 2);
        assert_eq!(plan.to_summarize, vec![Message::user("read a")]);
    }

    #[test]
    fn test_plan_nothing_to_summarize() {
        let messages = conversation();
        let err = plan(&messages, &PerMessageEstimator(1), 100, Some(10))
            .err()
            .unwrap();
        assert_eq!(err, SummarizeError::NothingToSummarize);
    }

    #[test]
    fn test_plan_budget_derived() {
        let messages = conversation();
        // (5 - 1 system) / 2 = 2 tokens of suffix
        let plan = plan(&messages, &PerMessageEstimator(1), 5, None).unwrap();
        assert_eq!(plan.cut, 4);
        assert_eq!(plan.to_summarize.len(), 3);
    }

    #[test]
    fn test_plan_keeps_latest_exchange() {
        let messages = conversation();
        let plan = plan(&messages, &PerMessageEstimator(1), 100, Some(0)).unwrap();
        assert_eq!(plan.cut, 5);
        assert_eq!(plan.to_summarize.len(), 4);

        // A trailing tool result keeps the call it answers
        let plan = plan_for_tail_result();
        assert_eq!(plan.cut, 2);
        assert_eq!(plan.to_summarize, vec![Message::user("read a")]);
    }

    fn plan_for_tail_result() -> SummaryPlan {
        let messages = &conversation()[..4];
        plan(messages, &PerMessageEstimator(1), 100, Some(0)).unwrap()
    }

    #[test]
    fn test_plan_keeps_oversized_latest_message() {
        let messages = vec![
            Message::user("first"),
            Message::user("second"),
            Message::user("x".repeat(400)),
        ];
        // The last message alone is over half the budget
        let plan = plan(&messages, &CharEstimator::default(), 50, None).unwrap();
        assert_eq!(plan.cut, 2);
        assert_eq!(plan.to_summarize.len(), 2);
    }

    #[test]
    fn test_assemble_places_summary_after_prefix_system() {
        let messages = conversation();
        let plan = plan(&messages, &PerMessageEstimator(1), 5, None).unwrap();
        let view = assemble(&messages, &plan, "read file a");
        assert_eq!(view.len(), 4);
        assert_eq!(view[0], Message::system("rules"));
        assert!(view[1].is_system());
        assert!(view[1].text().unwrap().starts_with(SUMMARY_PREFIX));
        assert!(view[1].text().unwrap().ends_with("read file a"));
        assert_eq!(view[3], Message::user("thanks"));
        assert!(pairs::find_orphans(&view).is_empty());
    }

    #[tokio::test]
    async fn test_summarize_bounded_success() {
        let summary = summarize_bounded(
            &StaticSummarizer("short summary"),
            &conversation(),
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(summary, "short summary");
    }

    #[tokio::test]
    async fn test_summarize_bounded_rejects_empty() {
        let err = summarize_bounded(
            &StaticSummarizer("   "),
            &conversation(),
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err, SummarizeError::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summarize_bounded_times_out() {
        let err = summarize_bounded(
            &SlowSummarizer,
            &conversation(),
            Duration::from_millis(50),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err, SummarizeError::TimedOut(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_summarize_bounded_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let err = summarize_bounded(
            &SlowSummarizer,
            &conversation(),
            Duration::from_secs(5),
            Some(&token),
        )
        .await
        .unwrap_err();
        assert_eq!(err, SummarizeError::Cancelled);
    }

    #[test]
    fn test_render_transcript() {
        let rendered = render_transcript(&conversation()[1..3]);
        assert!(rendered.contains("user: read a"));
        assert!(rendered.contains("-> read({}) [c1]"));
    }
}
