//! Sync coordinator: the single-flight drain state machine.
//!
//! The coordinator exclusively owns the mutation store and the identifier
//! reconciliation table. All write traffic funnels through
//! [`enqueue_or_attempt`](SyncCoordinator::enqueue_or_attempt); every trigger
//! source (connectivity, timer, foreground, forced) funnels into the same
//! drain entry point, so at most one cycle runs at a time and overlapping
//! triggers collapse into the running one.

use chrono::{DateTime, Utc};
use satchel_engine::{
    build_plan, classify_status, is_placeholder, next_state, Action, FailureKind, PendingMutation,
    ReconciliationTable, RouteTable, SyncState,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Result, SyncError};
use crate::status::{FailureLog, SyncFailure, SyncStatus};
use crate::store::MutationStore;
use crate::transport::{Request, TokenProvider, Transport, TransportError};

/// Result of the sole write entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueResult {
    /// Queue-entry id; stable for the lifetime of the queued mutation.
    pub local_id: String,
    /// For creates: the entity id the caller should use - the placeholder
    /// while pending, the server-assigned id after a direct success.
    pub entity_id: Option<String>,
    /// True if the mutation was queued rather than delivered directly.
    pub pending: bool,
}

/// Counts from one drain cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Network attempts made this cycle.
    pub attempted: usize,
    /// Mutations delivered and removed from the queue.
    pub synced: usize,
    /// Mutations that entered the terminal failed state.
    pub failed: usize,
    /// Mutations left pending (retryable failure or unmet dependency).
    pub deferred: usize,
    /// True when this trigger collapsed into an already-running cycle.
    pub collapsed: bool,
}

impl DrainReport {
    fn collapsed() -> Self {
        Self {
            collapsed: true,
            ..Default::default()
        }
    }
}

/// Outcome of one network attempt for one mutation.
enum Attempt {
    Success(Value),
    /// Dependency unmet: the payload still references an unmapped
    /// placeholder. Not a failure; no retry is consumed.
    Blocked,
    Failure(FailureKind, String),
}

/// Drains the queue against the network, serializing same-identity chains
/// and applying the retry/backoff policy.
pub struct SyncCoordinator {
    config: SyncConfig,
    routes: RouteTable,
    store: Arc<dyn MutationStore>,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    monitor: Arc<ConnectivityMonitor>,
    ids: StdMutex<ReconciliationTable>,
    failures: FailureLog,
    drain_lock: AsyncMutex<()>,
    in_progress: AtomicBool,
    // Last assigned queue position; positions never tie or go backward.
    seq: AtomicU64,
    last_sync: StdMutex<Option<DateTime<Utc>>>,
    last_cycle: StdMutex<Option<Instant>>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        routes: RouteTable,
        store: Arc<dyn MutationStore>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            config,
            routes,
            store,
            transport,
            tokens,
            monitor,
            ids: StdMutex::new(ReconciliationTable::new()),
            failures: FailureLog::new(),
            drain_lock: AsyncMutex::new(()),
            in_progress: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            last_sync: StdMutex::new(None),
            last_cycle: StdMutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------

    /// Submit a write: attempt it directly when safe, queue it otherwise.
    ///
    /// Creates without an `id` get a `local-` placeholder injected. Once the
    /// mutation is queued, failures never propagate to this caller - they
    /// surface through [`status`](Self::status).
    pub async fn enqueue_or_attempt(
        &self,
        entity_type: &str,
        action: Action,
        mut payload: Value,
    ) -> Result<EnqueueResult> {
        // Routes are static configuration; an unknown pair is a programming
        // error worth rejecting before anything is queued.
        self.routes.resolve(entity_type, action)?;

        let local_id = uuid::Uuid::new_v4().to_string();
        if action == Action::Create && payload.get("id").is_none() {
            if let Value::Object(map) = &mut payload {
                map.insert(
                    "id".to_string(),
                    Value::String(format!("local-{}", uuid::Uuid::new_v4())),
                );
            }
        }

        let mutation = PendingMutation::new(
            local_id.clone(),
            entity_type,
            action,
            payload,
            self.next_enqueue_position().await?,
        );

        if matches!(action, Action::Update | Action::Delete) && mutation.target_id().is_none() {
            return Err(satchel_engine::Error::MissingTargetId(local_id).into());
        }

        let entity_id = mutation.target_id().map(String::from);

        if self.monitor.is_online() && self.can_attempt_directly(&mutation).await? {
            // Hold the drain lock so the direct attempt cannot interleave
            // with a cycle touching the same identity.
            if let Ok(_guard) = self.drain_lock.try_lock() {
                match self.send(&mutation).await {
                    Attempt::Success(body) => {
                        let server_id = self.finish_create(&mutation, &body)?;
                        tracing::debug!(id = %local_id, entity_type, "delivered mutation directly");
                        return Ok(EnqueueResult {
                            local_id,
                            entity_id: server_id.or(entity_id),
                            pending: false,
                        });
                    }
                    Attempt::Blocked => {}
                    Attempt::Failure(FailureKind::Fatal, message) => {
                        // Queue it terminally so the caller can inspect and
                        // discard; the enqueue itself still succeeds.
                        self.make_room().await?;
                        let mut failed = mutation.clone();
                        failed.sync_state = SyncState::Failed;
                        failed.retry_count = 1;
                        failed.last_error = Some(message.clone());
                        self.store.append(&failed).await?;
                        self.failures.record(SyncFailure {
                            mutation_id: local_id.clone(),
                            entity_type: entity_type.to_string(),
                            message,
                            failed_at: Utc::now(),
                        });
                        return Ok(EnqueueResult {
                            local_id,
                            entity_id,
                            pending: true,
                        });
                    }
                    Attempt::Failure(_, message) => {
                        tracing::debug!(id = %local_id, %message, "direct attempt failed, queueing");
                    }
                }
            }
        }

        self.make_room().await?;
        self.store.append(&mutation).await?;
        tracing::debug!(id = %local_id, entity_type, action = %action, "queued mutation");

        Ok(EnqueueResult {
            local_id,
            entity_id,
            pending: true,
        })
    }

    /// Assign the next queue position: wall-clock milliseconds, bumped past
    /// both the previous assignment and anything already persisted.
    ///
    /// Two writes landing in the same millisecond (a create immediately
    /// followed by its dependent update) must still get distinct, increasing
    /// positions - the store orders by `(enqueued_at, id)`, and a tie would
    /// leave the chain order to the random queue-entry ids.
    async fn next_enqueue_position(&self) -> Result<u64> {
        if self.seq.load(Ordering::SeqCst) == 0 {
            let persisted = self
                .store
                .list(None)
                .await?
                .iter()
                .map(|m| m.enqueued_at)
                .max()
                .unwrap_or(0);
            self.seq.fetch_max(persisted, Ordering::SeqCst);
        }

        let now = Utc::now().timestamp_millis() as u64;
        let prev = self
            .seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(prev.saturating_add(1).max(now))
            })
            .unwrap_or_else(|prev| prev);
        Ok(prev.saturating_add(1).max(now))
    }

    /// Forced full drain: rejects when offline, reattempts failed items with
    /// their retry budget reset.
    pub async fn force_sync(&self) -> Result<DrainReport> {
        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }

        for mutation in self.store.list(None).await? {
            if mutation.sync_state == SyncState::Failed {
                self.store.reset_for_retry(&mutation.id).await?;
                self.failures.clear(&mutation.id);
            }
        }

        self.drain().await
    }

    /// Automatic trigger entry point: skips when offline or when the last
    /// cycle started less than `cycle_floor` ago.
    pub async fn try_drain(&self) -> Result<DrainReport> {
        if !self.monitor.is_online() {
            return Ok(DrainReport::default());
        }

        {
            let last = self.last_cycle.lock().expect("cycle clock poisoned");
            if let Some(started) = *last {
                if started.elapsed() < self.config.cycle_floor {
                    return Ok(DrainReport::default());
                }
            }
        }

        self.drain().await
    }

    /// Number of queued, not-yet-failed mutations.
    pub async fn pending_count(&self, entity_type: Option<&str>) -> Result<usize> {
        let items = self.store.list(entity_type).await?;
        Ok(items
            .iter()
            .filter(|m| m.sync_state != SyncState::Failed)
            .count())
    }

    /// Read-only aggregate for UI consumption.
    pub async fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            online: self.monitor.is_online(),
            pending_count: self.pending_count(None).await?,
            sync_in_progress: self.in_progress.load(Ordering::SeqCst),
            last_sync_time: *self.last_sync.lock().expect("sync clock poisoned"),
            errors: self.failures.snapshot(),
        })
    }

    /// Permanently remove a failed mutation.
    pub async fn discard(&self, local_id: &str) -> Result<()> {
        let mutation = self
            .store
            .get(local_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(local_id.to_string()))?;

        if mutation.sync_state != SyncState::Failed {
            return Err(SyncError::NotFailed(local_id.to_string()));
        }

        self.store.remove(local_id).await?;
        self.failures.clear(local_id);
        tracing::info!(id = %local_id, "discarded failed mutation");
        Ok(())
    }

    /// Resolve an entity id through the reconciliation table.
    pub fn resolve_id(&self, id: &str) -> String {
        self.ids
            .lock()
            .expect("id table poisoned")
            .resolve(id)
            .to_string()
    }

    // ------------------------------------------------------------------
    // Drain cycle
    // ------------------------------------------------------------------

    /// One drain cycle. Overlapping calls collapse into the running cycle.
    pub async fn drain(&self) -> Result<DrainReport> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("drain already in progress, collapsing trigger");
            return Ok(DrainReport::collapsed());
        };

        *self.last_cycle.lock().expect("cycle clock poisoned") = Some(Instant::now());
        self.in_progress.store(true, Ordering::SeqCst);
        let result = self.drain_inner().await;
        self.in_progress.store(false, Ordering::SeqCst);
        *self.last_sync.lock().expect("sync clock poisoned") = Some(Utc::now());

        if let Ok(report) = &result {
            tracing::info!(
                attempted = report.attempted,
                synced = report.synced,
                failed = report.failed,
                deferred = report.deferred,
                "drain cycle finished"
            );
        }
        result
    }

    async fn drain_inner(&self) -> Result<DrainReport> {
        let snapshot = self.store.list(None).await?;
        let plan = {
            let ids = self.ids.lock().expect("id table poisoned");
            build_plan(&snapshot, &ids)
        };

        if plan.is_empty() {
            return Ok(DrainReport::default());
        }

        tracing::debug!(groups = plan.groups.len(), items = plan.len(), "starting drain cycle");

        // Groups are independent dependency chains and drain concurrently;
        // within a group order is strict.
        let results =
            futures::future::join_all(plan.groups.into_iter().map(|g| self.drain_group(g))).await;

        let mut report = DrainReport::default();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(partial) => {
                    report.attempted += partial.attempted;
                    report.synced += partial.synced;
                    report.failed += partial.failed;
                    report.deferred += partial.deferred;
                }
                Err(e) => {
                    tracing::error!(error = %e, "drain group aborted");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn drain_group(&self, group: Vec<PendingMutation>) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        for (index, mutation) in group.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.item_delay).await;
            }

            self.store
                .update_state(&mutation.id, SyncState::Syncing, None)
                .await?;
            report.attempted += 1;

            match self.send(mutation).await {
                Attempt::Success(body) => {
                    self.finish_create(mutation, &body)?;
                    self.store.remove(&mutation.id).await?;
                    self.failures.clear(&mutation.id);
                    report.synced += 1;
                    tracing::debug!(id = %mutation.id, "mutation synced");
                }
                Attempt::Blocked => {
                    // Not an attempt in the retry sense.
                    report.attempted -= 1;
                    report.deferred += group.len() - index;
                    self.store
                        .update_state(&mutation.id, SyncState::Pending, None)
                        .await?;
                    tracing::debug!(id = %mutation.id, "dependency unmet, deferring chain");
                    break;
                }
                Attempt::Failure(kind, message) => {
                    let retry_count = mutation.retry_count + 1;
                    let state = match kind {
                        FailureKind::Fatal => SyncState::Failed,
                        _ => next_state(retry_count, self.config.max_retries, kind),
                    };
                    self.store
                        .record_failure(&mutation.id, state, retry_count, message.clone())
                        .await?;

                    if state == SyncState::Failed {
                        self.failures.record(SyncFailure {
                            mutation_id: mutation.id.clone(),
                            entity_type: mutation.entity_type.clone(),
                            message: message.clone(),
                            failed_at: Utc::now(),
                        });
                        report.failed += 1;
                        tracing::error!(id = %mutation.id, %message, "mutation failed terminally");
                    } else {
                        report.deferred += 1;
                        tracing::warn!(
                            id = %mutation.id,
                            retry_count,
                            %message,
                            "mutation attempt failed, will retry"
                        );
                    }

                    // The rest of the chain may depend on this item.
                    report.deferred += group.len() - index - 1;
                    break;
                }
            }
        }

        Ok(report)
    }

    // ------------------------------------------------------------------
    // Single attempt
    // ------------------------------------------------------------------

    async fn send(&self, mutation: &PendingMutation) -> Attempt {
        let (payload, target) = {
            let ids = self.ids.lock().expect("id table poisoned");
            let mut payload = mutation.payload.clone();
            ids.rewrite_payload(&mut payload);

            // A create's own placeholder id is expected to be unmapped; the
            // server assigns the real id, so it is not sent.
            if mutation.action == Action::Create {
                if let Value::Object(map) = &mut payload {
                    let own_placeholder = map
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(is_placeholder)
                        .unwrap_or(false);
                    if own_placeholder {
                        map.remove("id");
                    }
                }
            }

            if ids.has_unmapped_placeholder(&payload) {
                return Attempt::Blocked;
            }

            let target = payload
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from)
                .or_else(|| mutation.target_id().map(|t| ids.resolve(t).to_string()));
            (payload, target)
        };

        if matches!(mutation.action, Action::Update | Action::Delete) {
            if let Some(id) = &target {
                if is_placeholder(id) {
                    return Attempt::Blocked;
                }
            }
        }

        let endpoint = match self.routes.resolve(&mutation.entity_type, mutation.action) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!(id = %mutation.id, error = %e, "unresolvable route");
                return Attempt::Failure(FailureKind::Fatal, e.to_string());
            }
        };

        let path = match endpoint.path_for(target.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(id = %mutation.id, error = %e, "cannot render request path");
                return Attempt::Failure(FailureKind::Fatal, e.to_string());
            }
        };

        let request = Request {
            method: endpoint.method,
            path,
            body: match mutation.action {
                Action::Delete => None,
                _ => Some(payload),
            },
        };

        let response = match self.transport.execute(&request).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, TransportError::Unreachable(_)) {
                    self.monitor.set_reachable(false);
                }
                return Attempt::Failure(FailureKind::Retryable, e.to_string());
            }
        };
        self.monitor.set_reachable(true);

        if response.is_success() {
            return Attempt::Success(response.body);
        }

        match classify_status(response.status).unwrap_or(FailureKind::Retryable) {
            FailureKind::Auth => {
                let message = format!("auth rejected with status {}", response.status);
                if self.tokens.refresh().await {
                    tracing::warn!(id = %mutation.id, "credentials refreshed, will retry");
                    Attempt::Failure(FailureKind::Retryable, message)
                } else {
                    Attempt::Failure(FailureKind::Fatal, message)
                }
            }
            kind => Attempt::Failure(
                kind,
                format!("server responded with status {}", response.status),
            ),
        }
    }

    /// On a successful create, record the placeholder -> server id mapping.
    /// Returns the server id when one was assigned.
    fn finish_create(&self, mutation: &PendingMutation, body: &Value) -> Result<Option<String>> {
        if mutation.action != Action::Create {
            return Ok(None);
        }

        let server_id = match body.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        if let (Some(placeholder), Some(server_id)) = (mutation.target_id(), &server_id) {
            if is_placeholder(placeholder) {
                let mut ids = self.ids.lock().expect("id table poisoned");
                ids.record_mapping(placeholder, server_id.clone())?;
                tracing::debug!(placeholder, server_id, "recorded id mapping");
            }
        }

        Ok(server_id)
    }

    // ------------------------------------------------------------------
    // Queue bound
    // ------------------------------------------------------------------

    /// Direct delivery is only safe when nothing queued shares the identity
    /// chain; otherwise the new mutation must take its place in line.
    async fn can_attempt_directly(&self, mutation: &PendingMutation) -> Result<bool> {
        let queued = self.store.list(Some(&mutation.entity_type)).await?;
        if queued.is_empty() {
            return Ok(true);
        }

        let target = {
            let ids = self.ids.lock().expect("id table poisoned");
            mutation
                .target_id()
                .map(|id| ids.resolve(id).to_string())
        };
        let Some(target) = target else {
            return Ok(true);
        };

        let ids = self.ids.lock().expect("id table poisoned");
        Ok(!queued.iter().any(|m| {
            m.sync_state != SyncState::Failed
                && m.target_id().map(|id| ids.resolve(id) == target).unwrap_or(false)
        }))
    }

    /// Enforce the configured queue bound by evicting the oldest failed item.
    async fn make_room(&self) -> Result<()> {
        let Some(max) = self.config.max_queue_len else {
            return Ok(());
        };

        if self.store.count(None).await? < max {
            return Ok(());
        }

        let oldest_failed = self
            .store
            .list(None)
            .await?
            .into_iter()
            .find(|m| m.sync_state == SyncState::Failed);

        match oldest_failed {
            Some(victim) => {
                tracing::warn!(id = %victim.id, "queue full, evicting oldest failed mutation");
                self.store.remove(&victim.id).await?;
                self.failures.clear(&victim.id);
                Ok(())
            }
            None => Err(SyncError::QueueFull),
        }
    }
}
