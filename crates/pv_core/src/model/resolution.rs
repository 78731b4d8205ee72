//! Last-writer-wins resolution over edit history.
//!
//! # Invariants
//! - Presentation order is `(timestamp ASC, user ASC)`, ties keep append order.
//! - The winner is the latest timestamp; equal timestamps go to the
//!   lexically smallest user; identical `(timestamp, user)` pairs go to the
//!   lexically greatest change, so the winner never depends on arrival order.
//! - Both functions are pure and never reorder the input slice.

use crate::model::minutes::EditRecord;
use std::cmp::Ordering;

/// Presentation order for one history.
pub fn history_order(left: &EditRecord, right: &EditRecord) -> Ordering {
    left.timestamp
        .cmp(&right.timestamp)
        .then_with(|| left.user.cmp(&right.user))
}

/// Returns a copy of `records` in presentation order.
pub fn sorted_history(records: &[EditRecord]) -> Vec<EditRecord> {
    let mut sorted = records.to_vec();
    // stable: equal keys keep append order
    sorted.sort_by(history_order);
    sorted
}

/// Returns the record whose `change` is the current value, if any.
pub fn winning_edit(records: &[EditRecord]) -> Option<&EditRecord> {
    records.iter().fold(None, |best, candidate| match best {
        Some(current) if !supersedes(candidate, current) => Some(current),
        _ => Some(candidate),
    })
}

fn supersedes(candidate: &EditRecord, current: &EditRecord) -> bool {
    match candidate.timestamp.cmp(&current.timestamp) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match candidate.user.cmp(&current.user) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => candidate.change > current.change,
        },
    }
}
