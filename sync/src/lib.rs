//! # Satchel Sync
//!
//! The async IO shell around [`satchel_engine`]: durable mutation storage,
//! connectivity monitoring, the HTTP transport and the sync coordinator that
//! drains the offline queue once the backend is reachable again.
//!
//! ## Architecture
//!
//! - [`store::MutationStore`] - durable, ordered queue of pending mutations
//!   (SQLite-backed in production, in-memory for tests)
//! - [`connectivity::ConnectivityMonitor`] - deduplicated reachability
//!   transitions over a watch channel
//! - [`transport::Transport`] - the HTTP-like request seam; mocked in tests
//! - [`coordinator::SyncCoordinator`] - the single-flight drain state machine
//! - [`SyncClient`] - the public facade wiring triggers (connectivity,
//!   periodic timer, foreground events) into the coordinator
//!
//! All write traffic funnels through [`SyncClient::enqueue_or_attempt`]; the
//! queue and the identifier reconciliation table are owned exclusively by the
//! coordinator. Failures after an item has been queued never propagate to the
//! enqueueing caller - they surface asynchronously through
//! [`SyncClient::status`].

pub mod client;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod status;
pub mod store;
pub mod transport;

pub use client::SyncClient;
pub use config::{ConfigError, SyncConfig};
pub use connectivity::ConnectivityMonitor;
pub use coordinator::{DrainReport, EnqueueResult, SyncCoordinator};
pub use error::{Result, SyncError};
pub use status::{SyncFailure, SyncStatus};
pub use store::{MemoryStore, MutationStore, SqliteStore};
pub use transport::{
    HttpTransport, Request, Response, StaticToken, TokenProvider, Transport, TransportError,
};
