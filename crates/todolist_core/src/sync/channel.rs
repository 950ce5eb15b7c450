//! Subscription channel over a `RemoteStore` partition.

use crate::auth::PrincipalProvider;
use crate::error::{TodoError, TodoResult};
use crate::locks::lock_or_recover;
use crate::model::item::PartitionId;
use crate::model::snapshot::Snapshot;
use crate::store::{RemoteStore, StoreEvent, StoreListener, StoreSubscriptionId};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

const NO_VERSION: u64 = u64::MAX;

/// Event delivered to a subscription sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Full replacement snapshot, newer than any previously delivered.
    Snapshot(Snapshot),
    /// Terminal `TodoError::SubscriptionError`; no events follow.
    Failed(TodoError),
}

/// Callback receiving subscription events.
///
/// Runs on the store's delivery thread and should return quickly: a slow
/// sink delays every later delivery for the same subscription.
pub type SyncSink = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// Lifecycle of one subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Live,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

struct Subscription {
    id: SubscriptionId,
    partition: PartitionId,
    store: Arc<dyn RemoteStore>,
    sink: SyncSink,
    active: AtomicBool,
    store_id: OnceCell<StoreSubscriptionId>,
    state: Mutex<SubscriptionState>,
    last_version: AtomicU64,
    // Serializes deliveries; held while the sink runs.
    delivery: Mutex<()>,
    delivering_thread: Mutex<Option<ThreadId>>,
}

/// Marks the current thread as delivering; cleared on drop, unwinding included.
struct DeliveringThread<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DeliveringThread<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock_or_recover(slot) = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for DeliveringThread<'_> {
    fn drop(&mut self) {
        *lock_or_recover(self.0) = None;
    }
}

impl Subscription {
    fn new(
        id: SubscriptionId,
        partition: &str,
        store: Arc<dyn RemoteStore>,
        sink: SyncSink,
    ) -> Self {
        Self {
            id,
            partition: partition.to_string(),
            store,
            sink,
            active: AtomicBool::new(true),
            store_id: OnceCell::new(),
            state: Mutex::new(SubscriptionState::Subscribing),
            last_version: AtomicU64::new(NO_VERSION),
            delivery: Mutex::new(()),
            delivering_thread: Mutex::new(None),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn state(&self) -> SubscriptionState {
        *lock_or_recover(&self.state)
    }

    fn set_state(&self, state: SubscriptionState) {
        *lock_or_recover(&self.state) = state;
    }

    fn last_version(&self) -> Option<u64> {
        match self.last_version.load(Ordering::SeqCst) {
            NO_VERSION => None,
            version => Some(version),
        }
    }

    fn handle_event(&self, event: StoreEvent) {
        if !self.is_active() {
            return;
        }
        let _serial = lock_or_recover(&self.delivery);
        if !self.is_active() {
            return;
        }

        match event {
            StoreEvent::Snapshot(snapshot) => {
                let version = snapshot.version();
                if let Some(last) = self.last_version() {
                    if version <= last {
                        debug!(
                            "event=snapshot_dropped module=sync status=stale subscription_id={} version={} last_version={}",
                            self.id.0, version, last
                        );
                        return;
                    }
                }
                self.last_version.store(version, Ordering::SeqCst);
                self.set_state(SubscriptionState::Live);
                debug!(
                    "event=snapshot_delivered module=sync status=ok subscription_id={} version={} items={}",
                    self.id.0,
                    version,
                    snapshot.len()
                );
                self.run_sink(SyncEvent::Snapshot(snapshot));
            }
            StoreEvent::Failed(err) => {
                if !self.active.swap(false, Ordering::SeqCst) {
                    return;
                }
                warn!(
                    "event=subscription_failed module=sync status=error subscription_id={} error={}",
                    self.id.0, err
                );
                self.set_state(SubscriptionState::Error);
                self.run_sink(SyncEvent::Failed(TodoError::SubscriptionError(
                    err.to_string(),
                )));
                self.release_listener();
                self.set_state(SubscriptionState::Unsubscribed);
            }
        }
    }

    fn run_sink(&self, event: SyncEvent) {
        let _delivering = DeliveringThread::enter(&self.delivering_thread);
        (self.sink)(event);
    }

    /// Detaches from the store. Returns `false` when already detached.
    fn close(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.release_listener();

        // Wait out an in-flight delivery unless we are inside it.
        let inside_delivery =
            *lock_or_recover(&self.delivering_thread) == Some(thread::current().id());
        if !inside_delivery {
            drop(lock_or_recover(&self.delivery));
        }
        self.set_state(SubscriptionState::Unsubscribed);
        info!(
            "event=unsubscribe module=sync status=ok subscription_id={}",
            self.id.0
        );
        true
    }

    fn release_listener(&self) {
        if let Some(store_id) = self.store_id.get() {
            self.store.unsubscribe(*store_id);
        }
    }
}

/// Caller-side handle for one subscription.
///
/// Dropping the handle does not detach; call `SyncChannel::unsubscribe`.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Subscription>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    pub fn partition(&self) -> &str {
        &self.inner.partition
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.state()
    }

    /// Version of the last snapshot handed to the sink.
    pub fn last_version(&self) -> Option<u64> {
        self.inner.last_version()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.inner.id)
            .field("partition", &self.inner.partition)
            .field("state", &self.inner.state())
            .finish()
    }
}

/// Republishes ordered partition snapshots from a `RemoteStore`.
pub struct SyncChannel {
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn PrincipalProvider>,
    next_id: AtomicU64,
    subscriptions: Mutex<BTreeMap<SubscriptionId, Arc<Subscription>>>,
}

impl SyncChannel {
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn PrincipalProvider>) -> Self {
        Self {
            store,
            auth,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Subscribes `sink` to `partition`.
    ///
    /// The first event is the full current snapshot, usually delivered before
    /// this call returns.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in, or `partition` belongs
    ///   to another principal.
    /// - `ConnectionError` when the store is unreachable; retry with backoff.
    pub fn subscribe(&self, partition: &str, sink: SyncSink) -> TodoResult<SubscriptionHandle> {
        let principal = self
            .auth
            .current_principal()
            .ok_or(TodoError::NotAuthenticated)?;
        if principal != partition {
            warn!("event=subscribe module=sync status=error error_code=foreign_partition");
            return Err(TodoError::NotAuthenticated);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscription = Arc::new(Subscription::new(id, partition, self.store.clone(), sink));
        let weak = Arc::downgrade(&subscription);
        let listener: StoreListener = Arc::new(move |event| {
            if let Some(subscription) = weak.upgrade() {
                subscription.handle_event(event);
            }
        });

        let store_id = match self.store.subscribe(partition, listener) {
            Ok(store_id) => store_id,
            Err(err) => {
                subscription.active.store(false, Ordering::SeqCst);
                subscription.set_state(SubscriptionState::Unsubscribed);
                let err = TodoError::from(err);
                warn!(
                    "event=subscribe module=sync status=error subscription_id={} error_code={} error={}",
                    id.0,
                    err.code(),
                    err
                );
                return Err(err);
            }
        };
        let _ = subscription.store_id.set(store_id);
        if !subscription.is_active() {
            // Failed or closed during the initial delivery.
            self.store.unsubscribe(store_id);
        }

        info!(
            "event=subscribe module=sync status=ok subscription_id={} state={:?}",
            id.0,
            subscription.state()
        );
        let mut subscriptions = lock_or_recover(&self.subscriptions);
        subscriptions.retain(|_, existing| existing.is_active());
        if subscription.is_active() {
            subscriptions.insert(id, subscription.clone());
        }
        Ok(SubscriptionHandle {
            inner: subscription,
        })
    }

    /// Subscribes `sink` to the signed-in principal's own partition.
    pub fn subscribe_current(&self, sink: SyncSink) -> TodoResult<SubscriptionHandle> {
        let principal = self
            .auth
            .current_principal()
            .ok_or(TodoError::NotAuthenticated)?;
        self.subscribe(&principal, sink)
    }

    /// Releases a subscription. Idempotent and callable from any thread,
    /// including from inside the subscription's own sink.
    ///
    /// No events reach the sink after this returns.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        lock_or_recover(&self.subscriptions).remove(&handle.id());
        handle.inner.close();
    }

    /// Releases every subscription on `partition` (sign-out teardown).
    ///
    /// Returns the number of subscriptions that were still active.
    pub fn unsubscribe_partition(&self, partition: &str) -> usize {
        let detached: Vec<Arc<Subscription>> = {
            let mut subscriptions = lock_or_recover(&self.subscriptions);
            let ids: Vec<SubscriptionId> = subscriptions
                .iter()
                .filter(|(_, subscription)| subscription.partition == partition)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| subscriptions.remove(id))
                .collect()
        };
        detached
            .iter()
            .filter(|subscription| subscription.close())
            .count()
    }

    /// Number of subscriptions still attached to the store.
    pub fn active_count(&self) -> usize {
        lock_or_recover(&self.subscriptions)
            .values()
            .filter(|subscription| subscription.is_active())
            .count()
    }
}
