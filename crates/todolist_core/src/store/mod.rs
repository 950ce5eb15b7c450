//! Remote store contracts and implementations.
//!
//! # Responsibility
//! - Define the persistent, partitioned collection the core writes to.
//! - Push full replacement snapshots to partition listeners.
//!
//! # Invariants
//! - Every accepted write bumps the partition version by exactly one.
//! - Listeners are invoked without any store lock held, so a listener may
//!   call `unsubscribe` from inside a delivery.
//! - The first event for a new listener is the full current snapshot.

mod listeners;
mod memory;
mod sqlite;

pub use memory::{MemoryRemoteStore, WriteCounters};
pub use sqlite::SqliteRemoteStore;

pub(crate) use listeners::ListenerRegistry;

use crate::model::item::{ItemId, ItemPatch, NewItem, PartitionId};
use crate::model::snapshot::Snapshot;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failure reported by write and subscribe calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store cannot be reached right now.
    Unavailable(String),
    /// Caller may not read or write this partition.
    PermissionDenied(PartitionId),
    /// Target item does not exist in the partition.
    NotFound(ItemId),
    /// Any other backend failure.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::PermissionDenied(partition) => {
                write!(f, "permission denied for partition: {partition}")
            }
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::Backend(message) => write!(f, "store backend failure: {message}"),
        }
    }
}

impl Error for StoreError {}

/// Event pushed to a partition listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Snapshot(Snapshot),
    Failed(StoreError),
}

/// Push callback registered through `RemoteStore::subscribe`.
pub type StoreListener = Arc<dyn Fn(StoreEvent) + Send + Sync>;

/// Store-issued handle for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreSubscriptionId(pub u64);

/// Partitioned document store collaborator.
pub trait RemoteStore: Send + Sync {
    /// Creates an item and returns its store-assigned id.
    fn create(&self, partition: &str, item: &NewItem) -> StoreResult<ItemId>;

    /// Applies a partial field update to one item.
    fn update(&self, partition: &str, id: &str, patch: &ItemPatch) -> StoreResult<()>;

    /// Removes one item. Implementations may report `NotFound` for ids that
    /// are already gone.
    fn delete(&self, partition: &str, id: &str) -> StoreResult<()>;

    /// Registers a push listener for `partition`.
    fn subscribe(&self, partition: &str, listener: StoreListener)
        -> StoreResult<StoreSubscriptionId>;

    /// Releases a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: StoreSubscriptionId);
}

pub(crate) fn dispatch(listeners: &[StoreListener], event: &StoreEvent) {
    for listener in listeners {
        listener(event.clone());
    }
}
