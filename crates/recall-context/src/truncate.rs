//! Truncation: system messages plus the newest messages that fit

use std::collections::BTreeSet;

use recall_protocol::{pairs, Message};

use crate::compact::{minimal_floor, select, system_indices};
use crate::TokenEstimator;

/// Keep every system message and the longest pair-consistent suffix of the
/// remaining messages that fits in `budget`.
pub(crate) fn truncate(
    messages: &[Message],
    estimator: &dyn TokenEstimator,
    budget: usize,
) -> Vec<Message> {
    select(messages, &truncate_indices(messages, estimator, budget))
}

pub(crate) fn truncate_indices(
    messages: &[Message],
    estimator: &dyn TokenEstimator,
    budget: usize,
) -> BTreeSet<usize> {
    let costs: Vec<usize> = messages.iter().map(|m| estimator.estimate(m)).collect();
    let system = system_indices(messages);
    let system_tokens: usize = system.iter().map(|&idx| costs[idx]).sum();
    let available = budget.saturating_sub(system_tokens);

    let suffix_tokens = |cut: usize| -> usize {
        (cut..messages.len())
            .filter(|idx| !system.contains(idx))
            .map(|idx| costs[idx])
            .sum()
    };

    // Earliest cut whose suffix fits before pair adjustment
    let mut naive = messages.len();
    let mut used = 0;
    for idx in (0..messages.len()).rev() {
        if system.contains(&idx) {
            naive = idx;
            continue;
        }
        if used + costs[idx] > available {
            break;
        }
        used += costs[idx];
        naive = idx;
    }

    // Pair adjustment only moves the cut earlier, which may overflow; retry
    // with later cuts until the adjusted suffix fits.
    let cut = (naive..messages.len())
        .map(|candidate| pairs::shift_cut_for_pairs(messages, candidate))
        .find(|&adjusted| suffix_tokens(adjusted) <= available)
        .unwrap_or(messages.len());

    let has_content = (cut..messages.len()).any(|idx| !system.contains(&idx));
    if !has_content {
        return minimal_floor(messages);
    }

    let mut kept = system;
    kept.extend(cut..messages.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PerMessageEstimator;
    use recall_protocol::{Role, ToolCall};
    use serde_json::json;

    fn call(id: &str) -> Message {
        Message::assistant_with_tool_calls(vec![ToolCall::new(id, "read", json!({}))])
    }

    #[test]
    fn test_keeps_newest_messages() {
        let messages: Vec<_> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let view = truncate(&messages, &PerMessageEstimator(1), 3);
        let texts: Vec<_> = view.iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn test_keeps_system_messages() {
        let mut messages = vec![Message::system("rules")];
        messages.extend((0..10).map(|i| Message::user(format!("m{i}"))));
        let view = truncate(&messages, &PerMessageEstimator(1), 3);
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].role, Role::System);
        assert_eq!(view[2].text(), Some("m9"));
    }

    #[test]
    fn test_cut_never_orphans_tool_result() {
        let messages = vec![
            Message::user("read"),
            call("c1"),
            Message::tool_result("c1", "data"),
            Message::assistant("done"),
        ];
        // Budget for two messages would start at the tool result; the pair
        // does not fit so the cut moves past it instead.
        let view = truncate(&messages, &PerMessageEstimator(1), 2);
        assert_eq!(view, vec![Message::assistant("done")]);

        let view = truncate(&messages, &PerMessageEstimator(1), 3);
        assert_eq!(view.len(), 3);
        assert!(view[0].has_tool_calls());
        assert!(pairs::find_orphans(&view).is_empty());
    }

    #[test]
    fn test_degrades_to_floor() {
        let messages = vec![
            Message::system("rules"),
            Message::user("read"),
            call("c1"),
            Message::tool_result("c1", "data"),
        ];
        let view = truncate(&messages, &PerMessageEstimator(10), 5);
        assert_eq!(view.len(), 3);
        assert!(view[0].is_system());
        assert!(pairs::find_orphans(&view).is_empty());
    }

    #[test]
    fn test_interleaved_system_message_is_retained() {
        let messages = vec![
            Message::user("old"),
            Message::system("mid rules"),
            Message::user("new"),
        ];
        let view = truncate(&messages, &PerMessageEstimator(1), 2);
        assert_eq!(view, vec![Message::system("mid rules"), Message::user("new")]);
    }
}
