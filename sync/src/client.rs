//! Public sync client: the facade callers hold.
//!
//! Wires the trigger sources (connectivity transitions, a coarse periodic
//! timer, foreground/visibility events) into the coordinator's single-flight
//! entry point and delegates the public operations to it.

use satchel_engine::{Action, RouteTable};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::{DrainReport, EnqueueResult, SyncCoordinator};
use crate::error::Result;
use crate::status::SyncStatus;
use crate::store::{MutationStore, SqliteStore};
use crate::transport::{HttpTransport, TokenProvider, Transport};

/// Offline-capable write client.
///
/// All writes go through [`enqueue_or_attempt`](Self::enqueue_or_attempt);
/// the queue drains automatically once [`start`](Self::start) is called, or
/// on demand via [`force_sync`](Self::force_sync).
pub struct SyncClient {
    coordinator: Arc<SyncCoordinator>,
    monitor: Arc<ConnectivityMonitor>,
    poll_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncClient {
    /// Build a client over injected store and transport implementations.
    pub fn new(
        config: SyncConfig,
        routes: RouteTable,
        store: Arc<dyn MutationStore>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let monitor = Arc::new(ConnectivityMonitor::default());
        let poll_interval = config.poll_interval;
        let coordinator = Arc::new(SyncCoordinator::new(
            config,
            routes,
            store,
            transport,
            tokens,
            monitor.clone(),
        ));

        Self {
            coordinator,
            monitor,
            poll_interval,
            task: Mutex::new(None),
        }
    }

    /// Build the production pair: SQLite-backed store + reqwest transport.
    pub async fn connect(
        config: SyncConfig,
        routes: RouteTable,
        store_url: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::connect(store_url).await?);
        let transport = Arc::new(HttpTransport::new(
            config.base_url.clone(),
            config.request_timeout,
            tokens.clone(),
        ));
        Ok(Self::new(config, routes, store, transport, tokens))
    }

    /// Spawn the background drain loop. Idempotent.
    pub fn start(&self) {
        let mut task = self.task.lock().expect("task handle poisoned");
        if task.is_some() {
            return;
        }

        let coordinator = self.coordinator.clone();
        let mut rx = self.monitor.subscribe();
        let poll_interval = self.poll_interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup does not
            // race app initialization.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *rx.borrow_and_update();
                        if online {
                            tracing::info!("connectivity restored, draining queue");
                            if let Err(e) = coordinator.try_drain().await {
                                tracing::error!(error = %e, "connectivity-triggered drain failed");
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.try_drain().await {
                            tracing::error!(error = %e, "periodic drain failed");
                        }
                    }
                }
            }
        }));
    }

    /// Stop the background drain loop.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().expect("task handle poisoned").take() {
            task.abort();
        }
    }

    /// Feed a reachability signal from the platform.
    pub fn set_reachable(&self, online: bool) {
        self.monitor.set_reachable(online);
    }

    /// The app returned to the foreground; nudge a drain.
    pub async fn notify_foreground(&self) {
        if let Err(e) = self.coordinator.try_drain().await {
            tracing::error!(error = %e, "foreground-triggered drain failed");
        }
    }

    /// Submit a write. See [`SyncCoordinator::enqueue_or_attempt`].
    pub async fn enqueue_or_attempt(
        &self,
        entity_type: &str,
        action: Action,
        payload: Value,
    ) -> Result<EnqueueResult> {
        self.coordinator
            .enqueue_or_attempt(entity_type, action, payload)
            .await
    }

    /// Trigger an immediate forced drain; rejects when offline.
    pub async fn force_sync(&self) -> Result<DrainReport> {
        self.coordinator.force_sync().await
    }

    /// Number of queued, not-yet-failed mutations.
    pub async fn pending_count(&self, entity_type: Option<&str>) -> Result<usize> {
        self.coordinator.pending_count(entity_type).await
    }

    /// Read-only sync status for UI consumption.
    pub async fn status(&self) -> Result<SyncStatus> {
        self.coordinator.status().await
    }

    /// Permanently remove a failed mutation.
    pub async fn discard(&self, local_id: &str) -> Result<()> {
        self.coordinator.discard(local_id).await
    }

    /// Resolve a (possibly placeholder) entity id to its server form.
    pub fn resolve_id(&self, id: &str) -> String {
        self.coordinator.resolve_id(id)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
