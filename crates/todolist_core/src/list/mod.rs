//! Presentation-facing list state.
//!
//! # Responsibility
//! - Hold the single authoritative mirror of the latest partition snapshot.
//! - Notify observers with immutable snapshots on every applied change.
//! - Project items into display rows.
//!
//! # Invariants
//! - Display order equals store delivery order.
//! - Entries are only ever replaced wholesale, never mutated in place.

mod observable;
mod rows;

pub use observable::{ListSubscription, ObservableList, SnapshotCallback};
pub use rows::ListRow;
