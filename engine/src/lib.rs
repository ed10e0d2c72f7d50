//! # Satchel Engine
//!
//! The deterministic core of Satchel's offline mutation queue.
//!
//! This crate holds the pure logic for queueing domain writes while a client
//! is disconnected and replaying them once connectivity returns: mutation
//! types, placeholder-identifier reconciliation, endpoint resolution, drain
//! planning and the failure taxonomy. It performs no IO - persistence and the
//! network live in `satchel-sync`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: the same queue snapshot always produces the same plan
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Pending mutations
//!
//! Every write is a [`PendingMutation`]: an [`Action`] (create, update,
//! delete) against an entity type, with a JSON payload and a queue position
//! fixed by `enqueued_at`. A mutation leaves the queue only by syncing
//! (removal) or by entering the terminal [`SyncState::Failed`] state.
//!
//! ### Placeholder identifiers
//!
//! Entities created offline get a client-generated id with the `local-`
//! prefix. Once the create syncs and the server assigns the real id, the
//! [`ReconciliationTable`] rewrites every still-queued payload that mentions
//! the placeholder.
//!
//! ### Drain planning
//!
//! [`build_plan`] partitions eligible mutations into dependency groups keyed
//! by `(entity type, resolved target id)`. Items within a group keep strict
//! queue order - a delete never runs before the create it depends on - while
//! distinct groups are independent and may be drained concurrently.
//!
//! ## Quick Start
//!
//! ```rust
//! use satchel_engine::{
//!     Action, PendingMutation, ReconciliationTable, RouteTable, HttpMethod,
//!     build_plan,
//! };
//! use serde_json::json;
//!
//! // 1. Configure the route table
//! let mut routes = RouteTable::new();
//! routes.insert("product", Action::Create, HttpMethod::Post, "/products").unwrap();
//! routes.insert("product", Action::Update, HttpMethod::Put, "/products/{id}").unwrap();
//!
//! // 2. Queue a create and a dependent update
//! let create = PendingMutation::new(
//!     "m1", "product", Action::Create,
//!     json!({"id": "local-1", "name": "Tomatoes"}), 1000,
//! );
//! let update = PendingMutation::new(
//!     "m2", "product", Action::Update,
//!     json!({"id": "local-1", "price": 5}), 2000,
//! );
//!
//! // 3. Plan a drain: both land in one ordered group
//! let table = ReconciliationTable::new();
//! let plan = build_plan(&[update.clone(), create.clone()], &table);
//! assert_eq!(plan.groups.len(), 1);
//! assert_eq!(plan.groups[0][0].id, "m1");
//! ```

pub mod error;
pub mod idmap;
pub mod mutation;
pub mod outcome;
pub mod plan;
pub mod routes;

// Re-export main types at crate root
pub use error::Error;
pub use idmap::ReconciliationTable;
pub use mutation::{is_placeholder, Action, PendingMutation, SyncState, PLACEHOLDER_PREFIX};
pub use outcome::{classify_status, next_state, FailureKind, DEFAULT_MAX_RETRIES};
pub use plan::{build_plan, DrainPlan};
pub use routes::{Endpoint, HttpMethod, RouteTable};

/// Type aliases for clarity
pub type MutationId = String;
pub type EntityType = String;
pub type EntityId = String;
pub type Timestamp = u64;
