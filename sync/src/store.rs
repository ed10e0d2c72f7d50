//! Persistent mutation store.
//!
//! The durable, ordered queue of pending mutations. Every mutating call
//! persists before returning, so a crash between append and acknowledgment
//! never silently drops a queued write. Reads are a snapshot; no multi-item
//! transactions are needed beyond single-item atomicity.

use async_trait::async_trait;
use satchel_engine::{Action, MutationId, PendingMutation, SyncState};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, SyncError};

/// Contract for the durable mutation queue.
///
/// Owned exclusively by the sync coordinator; external callers only ever
/// append (via enqueue) and read.
#[async_trait]
pub trait MutationStore: Send + Sync {
    /// Persist a new mutation at the tail of the queue.
    async fn append(&self, mutation: &PendingMutation) -> Result<()>;

    /// Remove a mutation permanently (synced or discarded).
    async fn remove(&self, id: &str) -> Result<()>;

    /// Persist a state transition, replacing the stored error description.
    async fn update_state(&self, id: &str, state: SyncState, error: Option<String>) -> Result<()>;

    /// Persist a failed attempt: state, bumped retry count and error in one
    /// atomic write.
    async fn record_failure(
        &self,
        id: &str,
        state: SyncState,
        retry_count: u32,
        error: String,
    ) -> Result<()>;

    /// Reset a mutation for a forced retry: pending, zero retries, no error.
    async fn reset_for_retry(&self, id: &str) -> Result<()>;

    /// Snapshot of the queue ordered by `(enqueued_at, id)`, optionally
    /// filtered by entity type.
    async fn list(&self, entity_type: Option<&str>) -> Result<Vec<PendingMutation>>;

    /// Fetch a single mutation by queue-entry id.
    async fn get(&self, id: &str) -> Result<Option<PendingMutation>>;

    /// Number of stored mutations, optionally filtered by entity type.
    async fn count(&self, entity_type: Option<&str>) -> Result<usize>;
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed store used in production.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if it does not exist yet.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `sqlite://satchel.db?mode=rwc` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_mutations (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                action TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                sync_state TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_pending_mutations_order
            ON pending_mutations (enqueued_at, id)
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn from_row(row: &SqliteRow) -> Result<PendingMutation> {
        let action: String = row.try_get("action").map_err(SyncError::Storage)?;
        let state: String = row.try_get("sync_state").map_err(SyncError::Storage)?;
        let payload: String = row.try_get("payload").map_err(SyncError::Storage)?;
        let retry_count: i64 = row.try_get("retry_count").map_err(SyncError::Storage)?;
        let enqueued_at: i64 = row.try_get("enqueued_at").map_err(SyncError::Storage)?;

        Ok(PendingMutation {
            id: row.try_get("id").map_err(SyncError::Storage)?,
            entity_type: row.try_get("entity_type").map_err(SyncError::Storage)?,
            action: parse_action(&action)?,
            payload: serde_json::from_str(&payload)?,
            enqueued_at: enqueued_at as u64,
            sync_state: parse_state(&state)?,
            retry_count: retry_count as u32,
            last_error: row.try_get("last_error").map_err(SyncError::Storage)?,
        })
    }
}

fn parse_action(raw: &str) -> Result<Action> {
    match raw {
        "create" => Ok(Action::Create),
        "update" => Ok(Action::Update),
        "delete" => Ok(Action::Delete),
        other => Err(SyncError::Engine(satchel_engine::Error::InvalidPayload(
            format!("unknown action '{other}'"),
        ))),
    }
}

fn parse_state(raw: &str) -> Result<SyncState> {
    match raw {
        "pending" => Ok(SyncState::Pending),
        "syncing" => Ok(SyncState::Syncing),
        "failed" => Ok(SyncState::Failed),
        other => Err(SyncError::Engine(satchel_engine::Error::InvalidPayload(
            format!("unknown sync state '{other}'"),
        ))),
    }
}

#[async_trait]
impl MutationStore for SqliteStore {
    async fn append(&self, mutation: &PendingMutation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_mutations (
                id, entity_type, action, payload,
                enqueued_at, sync_state, retry_count, last_error
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&mutation.id)
        .bind(&mutation.entity_type)
        .bind(mutation.action.as_str())
        .bind(serde_json::to_string(&mutation.payload)?)
        .bind(mutation.enqueued_at as i64)
        .bind(mutation.sync_state.as_str())
        .bind(mutation.retry_count as i64)
        .bind(&mutation.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_mutations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_state(&self, id: &str, state: SyncState, error: Option<String>) -> Result<()> {
        sqlx::query("UPDATE pending_mutations SET sync_state = ?1, last_error = ?2 WHERE id = ?3")
            .bind(state.as_str())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &str,
        state: SyncState,
        retry_count: u32,
        error: String,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pending_mutations
            SET sync_state = ?1, retry_count = ?2, last_error = ?3
            WHERE id = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(retry_count as i64)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_for_retry(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pending_mutations
            SET sync_state = 'pending', retry_count = 0, last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, entity_type: Option<&str>) -> Result<Vec<PendingMutation>> {
        let rows = match entity_type {
            Some(entity_type) => {
                sqlx::query(
                    r#"
                    SELECT id, entity_type, action, payload,
                           enqueued_at, sync_state, retry_count, last_error
                    FROM pending_mutations
                    WHERE entity_type = ?1
                    ORDER BY enqueued_at ASC, id ASC
                    "#,
                )
                .bind(entity_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, entity_type, action, payload,
                           enqueued_at, sync_state, retry_count, last_error
                    FROM pending_mutations
                    ORDER BY enqueued_at ASC, id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::from_row).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<PendingMutation>> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_type, action, payload,
                   enqueued_at, sync_state, retry_count, last_error
            FROM pending_mutations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn count(&self, entity_type: Option<&str>) -> Result<usize> {
        let count: (i64,) = match entity_type {
            Some(entity_type) => {
                sqlx::query_as("SELECT COUNT(*) FROM pending_mutations WHERE entity_type = ?1")
                    .bind(entity_type)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM pending_mutations")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count.0 as usize)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<MutationId, PendingMutation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_item<T>(&self, id: &str, f: impl FnOnce(&mut PendingMutation) -> T) -> Result<T> {
        let mut items = self.items.lock().expect("memory store poisoned");
        items
            .get_mut(id)
            .map(f)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MutationStore for MemoryStore {
    async fn append(&self, mutation: &PendingMutation) -> Result<()> {
        let mut items = self.items.lock().expect("memory store poisoned");
        items.insert(mutation.id.clone(), mutation.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut items = self.items.lock().expect("memory store poisoned");
        items.remove(id);
        Ok(())
    }

    async fn update_state(&self, id: &str, state: SyncState, error: Option<String>) -> Result<()> {
        self.with_item(id, |m| {
            m.sync_state = state;
            m.last_error = error;
        })
    }

    async fn record_failure(
        &self,
        id: &str,
        state: SyncState,
        retry_count: u32,
        error: String,
    ) -> Result<()> {
        self.with_item(id, |m| {
            m.sync_state = state;
            m.retry_count = retry_count;
            m.last_error = Some(error);
        })
    }

    async fn reset_for_retry(&self, id: &str) -> Result<()> {
        self.with_item(id, |m| {
            m.sync_state = SyncState::Pending;
            m.retry_count = 0;
            m.last_error = None;
        })
    }

    async fn list(&self, entity_type: Option<&str>) -> Result<Vec<PendingMutation>> {
        let items = self.items.lock().expect("memory store poisoned");
        let mut result: Vec<PendingMutation> = items
            .values()
            .filter(|m| entity_type.map(|t| m.entity_type == t).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<PendingMutation>> {
        let items = self.items.lock().expect("memory store poisoned");
        Ok(items.get(id).cloned())
    }

    async fn count(&self, entity_type: Option<&str>) -> Result<usize> {
        let items = self.items.lock().expect("memory store poisoned");
        Ok(items
            .values()
            .filter(|m| entity_type.map(|t| m.entity_type == t).unwrap_or(true))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(id: &str, at: u64) -> PendingMutation {
        PendingMutation::new(id, "product", Action::Create, json!({"id": "local-1"}), at)
    }

    #[tokio::test]
    async fn memory_append_list_remove() {
        let store = MemoryStore::new();
        store.append(&sample("m2", 2000)).await.unwrap();
        store.append(&sample("m1", 1000)).await.unwrap();

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "m1");

        store.remove("m1").await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_state_transitions() {
        let store = MemoryStore::new();
        store.append(&sample("m1", 1000)).await.unwrap();

        store
            .record_failure("m1", SyncState::Failed, 4, "server error 500".into())
            .await
            .unwrap();
        let m = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m.sync_state, SyncState::Failed);
        assert_eq!(m.retry_count, 4);

        store.reset_for_retry("m1").await.unwrap();
        let m = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m.sync_state, SyncState::Pending);
        assert_eq!(m.retry_count, 0);
        assert!(m.last_error.is_none());
    }

    #[tokio::test]
    async fn memory_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store.update_state("nope", SyncState::Syncing, None).await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn sqlite_roundtrip() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

        let mutation = sample("m1", 1000);
        store.append(&mutation).await.unwrap();

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], mutation);

        store
            .update_state("m1", SyncState::Syncing, None)
            .await
            .unwrap();
        let m = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m.sync_state, SyncState::Syncing);

        assert_eq!(store.count(Some("product")).await.unwrap(), 1);
        assert_eq!(store.count(Some("order")).await.unwrap(), 0);

        store.remove("m1").await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_list_is_ordered() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.append(&sample("m3", 3000)).await.unwrap();
        store.append(&sample("m1", 1000)).await.unwrap();
        store.append(&sample("m2", 2000)).await.unwrap();

        let ids: Vec<_> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }
}
