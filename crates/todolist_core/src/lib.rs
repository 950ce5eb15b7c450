//! Core of the to-do list app.
//!
//! Items live in a partitioned `RemoteStore`; a `SyncChannel` republishes
//! ordered snapshots into an `ObservableList`; `TodoService` turns user
//! actions into fire-and-forget store writes.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod exec;
pub mod list;
mod locks;
pub mod logging;
pub mod model;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;

pub use auth::{AuthError, LocalPrincipalProvider, PrincipalId, PrincipalProvider, SignInRequest};
pub use config::{ConfigError, CoreConfig, WriteDispatch};
pub use error::{TodoError, TodoResult};
pub use exec::{Executor, InlineExecutor, WorkerExecutor};
pub use list::{ListRow, ListSubscription, ObservableList, SnapshotCallback};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{Item, ItemId, ItemPatch, ItemValidationError, NewItem, PartitionId};
pub use model::snapshot::Snapshot;
pub use service::todo_service::{LogErrorSink, TodoService, WriteErrorSink, WriteFailure, WriteOp};
pub use session::{SessionError, SessionStatus, TodoSession};
pub use store::{
    MemoryRemoteStore, RemoteStore, SqliteRemoteStore, StoreError, StoreEvent, StoreListener,
    StoreSubscriptionId,
};
pub use sync::{SubscriptionHandle, SubscriptionState, SyncChannel, SyncEvent, SyncSink};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
