//! Drain planning: which mutations go out, and in what order.
//!
//! A plan partitions the eligible queue into dependency groups. Within a
//! group the queue order is strict - a failure at position k halts the rest
//! of that group for the cycle - while distinct groups are independent and
//! may be drained concurrently.

use crate::{PendingMutation, ReconciliationTable, SyncState};

/// An ordered drain pass over the eligible queue.
#[derive(Debug, Clone, Default)]
pub struct DrainPlan {
    /// Dependency groups, ordered by their earliest member. Each group is in
    /// strict queue order.
    pub groups: Vec<Vec<PendingMutation>>,
}

impl DrainPlan {
    /// Total number of mutations in the plan.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Whether the plan has nothing to send.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Build a drain plan from a queue snapshot.
///
/// Failed items are excluded (they only re-enter via an explicit forced
/// retry). The remainder is ordered by `(enqueued_at, id)` and partitioned by
/// `(entity type, resolved target identity)`: the target id is passed through
/// the reconciliation table, so a chain enqueued against a placeholder stays
/// in one group even after the create's mapping is recorded.
pub fn build_plan(mutations: &[PendingMutation], table: &ReconciliationTable) -> DrainPlan {
    let mut eligible: Vec<&PendingMutation> = mutations
        .iter()
        .filter(|m| m.sync_state != SyncState::Failed)
        .collect();
    eligible.sort_by(|a, b| {
        a.enqueued_at
            .cmp(&b.enqueued_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Groups keep first-appearance order, which after the sort above is
    // earliest-member order.
    let mut keys: Vec<(String, String)> = Vec::new();
    let mut groups: Vec<Vec<PendingMutation>> = Vec::new();

    for mutation in eligible {
        let identity = mutation
            .target_id()
            .map(|id| table.resolve(id).to_string())
            // A mutation with no target id depends on nothing; it forms its
            // own group keyed by the queue-entry id.
            .unwrap_or_else(|| format!("__queued__{}", mutation.id));
        let key = (mutation.entity_type.clone(), identity);

        match keys.iter().position(|k| *k == key) {
            Some(idx) => groups[idx].push(mutation.clone()),
            None => {
                keys.push(key);
                groups.push(vec![mutation.clone()]);
            }
        }
    }

    DrainPlan { groups }
}
