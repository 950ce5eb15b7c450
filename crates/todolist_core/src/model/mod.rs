//! Domain model for to-do items and partition snapshots.
//!
//! # Responsibility
//! - Define the record shapes shared by store, sync and presentation layers.
//! - Keep write payloads (`NewItem`, `ItemPatch`) separate from read records.
//!
//! # Invariants
//! - Item ids are assigned by the store, never by callers.
//! - Item text is immutable after creation; only `done` is patched.
//! - Snapshots are immutable once built.

pub mod item;
pub mod snapshot;
