//! Read-only sync status aggregation.
//!
//! Consumed by UI layers; never a mutation path. The failure log is a
//! DashMap so status reads never contend with a running drain cycle.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use satchel_engine::{EntityType, MutationId};
use serde::{Deserialize, Serialize};

/// A terminally failed mutation, kept visible until discarded or retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub mutation_id: MutationId,
    pub entity_type: EntityType,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

/// Snapshot exposed to callers via `SyncClient::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub pending_count: usize,
    pub sync_in_progress: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub errors: Vec<SyncFailure>,
}

/// Registry of terminal failures, written by the coordinator and read by the
/// status facade.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: DashMap<MutationId, SyncFailure>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the failure for a mutation.
    pub fn record(&self, failure: SyncFailure) {
        self.entries.insert(failure.mutation_id.clone(), failure);
    }

    /// Clear the failure for a mutation that synced or was discarded.
    pub fn clear(&self, mutation_id: &str) {
        self.entries.remove(mutation_id);
    }

    /// Snapshot of all recorded failures, oldest first.
    pub fn snapshot(&self) -> Vec<SyncFailure> {
        let mut failures: Vec<SyncFailure> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        failures.sort_by(|a, b| a.failed_at.cmp(&b.failed_at));
        failures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str, at: i64) -> SyncFailure {
        SyncFailure {
            mutation_id: id.to_string(),
            entity_type: "product".to_string(),
            message: "server error 500".to_string(),
            failed_at: DateTime::from_timestamp(at, 0).unwrap(),
        }
    }

    #[test]
    fn record_clear_snapshot() {
        let log = FailureLog::new();
        log.record(failure("m2", 200));
        log.record(failure("m1", 100));
        assert_eq!(log.len(), 2);

        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].mutation_id, "m1");
        assert_eq!(snapshot[1].mutation_id, "m2");

        log.clear("m1");
        assert_eq!(log.len(), 1);
        log.clear("m1");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn status_serialization_format() {
        let status = SyncStatus {
            online: true,
            pending_count: 2,
            sync_in_progress: false,
            last_sync_time: None,
            errors: vec![failure("m1", 100)],
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"pendingCount\":2"));
        assert!(json.contains("\"syncInProgress\":false"));
        assert!(json.contains("\"mutationId\":\"m1\""));
    }
}
