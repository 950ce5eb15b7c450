//! Live partition synchronization.
//!
//! # Responsibility
//! - Turn store push notifications into ordered snapshot deliveries.
//! - Own listener lifecycle for each subscription.
//!
//! # Invariants
//! - Deliveries for one subscription never overlap.
//! - A snapshot whose version is not newer than the last delivered one is
//!   dropped.
//! - Delivery failures are terminal for the subscription and never retried
//!   by the channel.

mod channel;

pub use channel::{
    SubscriptionHandle, SubscriptionId, SubscriptionState, SyncChannel, SyncEvent, SyncSink,
};
