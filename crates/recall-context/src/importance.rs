//! Importance ranking: keep the highest scoring messages that fit

use std::cmp::Ordering;
use std::collections::BTreeSet;

use recall_protocol::{pairs, Message, Role};
use serde::{Deserialize, Serialize};

use crate::compact::{minimal_floor, select, system_indices};
use crate::TokenEstimator;

/// Weights combined into a message score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceWeights {
    /// Scales position in the conversation, newest = 1.0
    pub recency: f64,
    pub user: f64,
    pub assistant: f64,
    pub tool: f64,
    /// Added when a message issues or answers a tool call
    pub tool_content: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            user: 0.5,
            assistant: 0.3,
            tool: 0.2,
            tool_content: 0.25,
        }
    }
}

impl ImportanceWeights {
    fn role_weight(&self, role: Role) -> f64 {
        match role {
            Role::User => self.user,
            Role::Assistant => self.assistant,
            Role::Tool => self.tool,
            Role::System => 0.0,
        }
    }

    /// Score of the message at `rank` among `total` non-system messages
    pub fn score(&self, message: &Message, rank: usize, total: usize) -> f64 {
        let recency = if total == 0 {
            0.0
        } else {
            (rank + 1) as f64 / total as f64
        };
        let tool_bonus = if message.has_tool_calls() || message.role == Role::Tool {
            self.tool_content
        } else {
            0.0
        };
        recency * self.recency + self.role_weight(message.role) + tool_bonus
    }
}

pub(crate) fn rank_and_select(
    messages: &[Message],
    estimator: &dyn TokenEstimator,
    budget: usize,
    weights: &ImportanceWeights,
) -> Vec<Message> {
    let costs: Vec<usize> = messages.iter().map(|m| estimator.estimate(m)).collect();
    let mut kept = system_indices(messages);
    let mut used: usize = kept.iter().map(|&idx| costs[idx]).sum();

    let candidates: Vec<usize> = (0..messages.len())
        .filter(|idx| !kept.contains(idx))
        .collect();
    let total = candidates.len();

    let mut ranked: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(rank, &idx)| (idx, weights.score(&messages[idx], rank, total)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    });

    let mut selected_any = false;
    for (idx, _) in ranked {
        if kept.contains(&idx) {
            continue;
        }
        let group: BTreeSet<usize> = pairs::pair_closure(messages, idx)
            .into_iter()
            .filter(|member| !kept.contains(member))
            .collect();
        let cost: usize = group.iter().map(|&member| costs[member]).sum();
        if used + cost <= budget {
            used += cost;
            kept.extend(group);
            selected_any = true;
        }
    }

    if !selected_any {
        return select(messages, &minimal_floor(messages));
    }

    pairs::repair_pairs(messages, &mut kept);
    select(messages, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PerMessageEstimator;
    use recall_protocol::ToolCall;
    use serde_json::json;

    #[test]
    fn test_score_prefers_recent_and_user() {
        let weights = ImportanceWeights::default();
        let old = weights.score(&Message::user("a"), 0, 10);
        let new = weights.score(&Message::user("a"), 9, 10);
        assert!(new > old);

        let user = weights.score(&Message::user("a"), 5, 10);
        let assistant = weights.score(&Message::assistant("a"), 5, 10);
        assert!(user > assistant);
    }

    #[test]
    fn test_selection_keeps_order_and_system() {
        let messages = vec![
            Message::system("rules"),
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
            Message::assistant("four"),
        ];
        let view = rank_and_select(
            &messages,
            &PerMessageEstimator(1),
            3,
            &ImportanceWeights::default(),
        );
        assert_eq!(
            view,
            vec![
                Message::system("rules"),
                Message::user("three"),
                Message::assistant("four"),
            ]
        );
    }

    #[test]
    fn test_selection_takes_pairs_whole() {
        let messages = vec![
            Message::user("read"),
            Message::assistant_with_tool_calls(vec![ToolCall::new("c1", "read", json!({}))]),
            Message::tool_result("c1", "data"),
            Message::user("next"),
        ];
        let view = rank_and_select(
            &messages,
            &PerMessageEstimator(1),
            3,
            &ImportanceWeights::default(),
        );
        assert!(pairs::find_orphans(&view).is_empty());
        assert!(view.len() <= 3);
        assert_eq!(view.last(), Some(&Message::user("next")));
    }

    #[test]
    fn test_selection_degrades_to_floor() {
        let messages = vec![Message::system("rules"), Message::user("huge")];
        let view = rank_and_select(
            &messages,
            &PerMessageEstimator(10),
            5,
            &ImportanceWeights::default(),
        );
        assert_eq!(messages, view);
    }
}
