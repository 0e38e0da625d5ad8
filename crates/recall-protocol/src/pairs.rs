//! Tool-call / tool-result pairing helpers
//!
//! A tool pair is an assistant message issuing a call and the tool message
//! answering it. Views derived from a transcript may drop both halves of a
//! pair but never only one of them.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::Message;

/// Half of a tool pair whose partner is missing from a view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Orphan {
    /// A tool result whose call is absent
    Result { tool_call_id: String },
    /// A tool call whose result is absent
    Call { id: String },
}

/// Index of pair partners within one message sequence
struct PairIndex<'a> {
    callers: HashMap<&'a str, usize>,
    answers: HashMap<&'a str, Vec<usize>>,
}

impl<'a> PairIndex<'a> {
    fn build(messages: &'a [Message]) -> Self {
        let mut callers = HashMap::new();
        let mut answers: HashMap<&str, Vec<usize>> = HashMap::new();

        for (idx, message) in messages.iter().enumerate() {
            for id in message.call_ids() {
                callers.entry(id).or_insert(idx);
            }
            if let Some(id) = message.answered_call_id() {
                answers.entry(id).or_default().push(idx);
            }
        }

        Self { callers, answers }
    }

    fn partners(&self, messages: &[Message], idx: usize) -> Vec<usize> {
        let message = &messages[idx];
        let mut partners = Vec::new();

        if let Some(id) = message.answered_call_id() {
            if let Some(&caller) = self.callers.get(id) {
                partners.push(caller);
            }
        }

        for id in message.call_ids() {
            if let Some(results) = self.answers.get(id) {
                partners.extend(results.iter().copied());
            }
        }

        partners
    }
}

/// Move a cut point earlier until no pair straddles it.
///
/// The returned index `c` satisfies `c <= cut`, and every pair with one half
/// in `messages[c..]` has its other half there too.
pub fn shift_cut_for_pairs(messages: &[Message], cut: usize) -> usize {
    let index = PairIndex::build(messages);
    let mut cut = cut.min(messages.len());

    loop {
        let earliest = (cut..messages.len())
            .flat_map(|idx| index.partners(messages, idx))
            .filter(|&partner| partner < cut)
            .min();

        match earliest {
            Some(partner) => cut = partner,
            None => return cut,
        }
    }
}

/// Add the partners of every kept index until the set is closed under pairing.
pub fn repair_pairs(messages: &[Message], kept: &mut BTreeSet<usize>) {
    let index = PairIndex::build(messages);
    let mut pending: Vec<usize> = kept.iter().copied().collect();

    while let Some(idx) = pending.pop() {
        for partner in index.partners(messages, idx) {
            if kept.insert(partner) {
                pending.push(partner);
            }
        }
    }
}

/// Indices that must be kept together with `idx`, including `idx` itself
pub fn pair_closure(messages: &[Message], idx: usize) -> BTreeSet<usize> {
    let mut set = BTreeSet::from([idx]);
    repair_pairs(messages, &mut set);
    set
}

/// Find every tool result or tool call in `view` whose partner is absent.
pub fn find_orphans(view: &[Message]) -> Vec<Orphan> {
    let call_ids: HashSet<&str> = view.iter().flat_map(|m| m.call_ids()).collect();
    let answered: HashSet<&str> = view.iter().filter_map(|m| m.answered_call_id()).collect();

    let mut orphans = Vec::new();
    for message in view {
        if let Some(id) = message.answered_call_id() {
            if !call_ids.contains(id) {
                orphans.push(Orphan::Result {
                    tool_call_id: id.to_string(),
                });
            }
        }
        for id in message.call_ids() {
            if !answered.contains(id) {
                orphans.push(Orphan::Call { id: id.to_string() });
            }
        }
    }
    orphans
}

/// Remove messages carrying orphans until none remain.
///
/// Dropping an assistant message can orphan other results, so this repeats
/// until the view is closed.
pub fn drop_orphans(mut view: Vec<Message>, tolerated: &[Orphan]) -> Vec<Message> {
    loop {
        let orphans: HashSet<Orphan> = find_orphans(&view)
            .into_iter()
            .filter(|o| !tolerated.contains(o))
            .collect();
        if orphans.is_empty() {
            return view;
        }

        view.retain(|message| {
            let bad_result = message.answered_call_id().is_some_and(|id| {
                orphans.contains(&Orphan::Result {
                    tool_call_id: id.to_string(),
                })
            });
            let bad_call = message
                .call_ids()
                .any(|id| orphans.contains(&Orphan::Call { id: id.to_string() }));
            !(bad_result || bad_call)
        });
    }
}
