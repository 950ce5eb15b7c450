//! In-process remote store.
//!
//! # Responsibility
//! - Provide a complete `RemoteStore` without any external service.
//! - Offer fault injection hooks for exercising failure paths.
//!
//! # Invariants
//! - Items keep creation order inside a partition.
//! - Failed or no-op writes never bump the partition version.

use super::{
    dispatch, ListenerRegistry, RemoteStore, StoreError, StoreEvent, StoreListener, StoreResult,
    StoreSubscriptionId,
};
use crate::locks::lock_or_recover;
use crate::model::item::{Item, ItemId, ItemPatch, NewItem, PartitionId};
use crate::model::snapshot::Snapshot;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Number of write calls received, including rejected ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounters {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct PartitionData {
    version: u64,
    items: Vec<Item>,
}

impl PartitionData {
    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.version, self.items.clone())
    }
}

struct MemoryState {
    partitions: HashMap<PartitionId, PartitionData>,
    listeners: ListenerRegistry,
    reachable: bool,
    revoked: HashSet<PartitionId>,
    pending_failure: Option<StoreError>,
    queued_ids: VecDeque<ItemId>,
    counters: WriteCounters,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            partitions: HashMap::new(),
            listeners: ListenerRegistry::default(),
            reachable: true,
            revoked: HashSet::new(),
            pending_failure: None,
            queued_ids: VecDeque::new(),
            counters: WriteCounters::default(),
        }
    }
}

impl MemoryState {
    fn check_writable(&mut self, partition: &str) -> StoreResult<()> {
        if !self.reachable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        if let Some(err) = self.pending_failure.take() {
            return Err(err);
        }
        if self.revoked.contains(partition) {
            return Err(StoreError::PermissionDenied(partition.to_string()));
        }
        Ok(())
    }

    fn next_id(&mut self) -> ItemId {
        self.queued_ids
            .pop_front()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
    }

    fn commit(&mut self, partition: &str) -> (Vec<StoreListener>, StoreEvent) {
        let data = self.partitions.entry(partition.to_string()).or_default();
        data.version += 1;
        let event = StoreEvent::Snapshot(data.snapshot());
        (self.listeners.for_partition(partition), event)
    }
}

/// `RemoteStore` kept entirely in memory.
///
/// Deliveries run synchronously on the thread that performed the write.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        lock_or_recover(&self.state)
    }

    /// Toggles simulated connectivity. Offline stores reject writes and new
    /// subscriptions with `StoreError::Unavailable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock_state().reachable = reachable;
    }

    /// Makes the next write call fail with `err`.
    pub fn fail_next_write(&self, err: StoreError) {
        self.lock_state().pending_failure = Some(err);
    }

    /// Queues ids handed out by subsequent `create` calls, in order.
    pub fn queue_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.lock_state()
            .queued_ids
            .extend(ids.into_iter().map(Into::into));
    }

    /// Revokes access to `partition` and pushes a failure to its listeners.
    pub fn revoke(&self, partition: &str) {
        let listeners = {
            let mut state = self.lock_state();
            state.revoked.insert(partition.to_string());
            state.listeners.for_partition(partition)
        };
        dispatch(
            &listeners,
            &StoreEvent::Failed(StoreError::PermissionDenied(partition.to_string())),
        );
    }

    /// Restores access to a previously revoked partition.
    pub fn restore(&self, partition: &str) {
        self.lock_state().revoked.remove(partition);
    }

    /// Pushes an arbitrary snapshot to `partition` listeners without touching
    /// stored state. Simulates replays and out-of-order redelivery.
    pub fn inject(&self, partition: &str, snapshot: Snapshot) {
        let listeners = self.lock_state().listeners.for_partition(partition);
        dispatch(&listeners, &StoreEvent::Snapshot(snapshot));
    }

    pub fn counters(&self) -> WriteCounters {
        self.lock_state().counters
    }

    pub fn listener_count(&self, partition: &str) -> usize {
        self.lock_state().listeners.count(partition)
    }

    pub fn items(&self, partition: &str) -> Vec<Item> {
        self.lock_state()
            .partitions
            .get(partition)
            .map(|data| data.items.clone())
            .unwrap_or_default()
    }

    pub fn version(&self, partition: &str) -> u64 {
        self.lock_state()
            .partitions
            .get(partition)
            .map_or(0, |data| data.version)
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn create(&self, partition: &str, item: &NewItem) -> StoreResult<ItemId> {
        let (id, listeners, event) = {
            let mut state = self.lock_state();
            state.counters.creates += 1;
            state.check_writable(partition)?;
            let id = state.next_id();
            state
                .partitions
                .entry(partition.to_string())
                .or_default()
                .items
                .push(item.clone().into_item(id.clone()));
            let (listeners, event) = state.commit(partition);
            (id, listeners, event)
        };
        dispatch(&listeners, &event);
        Ok(id)
    }

    fn update(&self, partition: &str, id: &str, patch: &ItemPatch) -> StoreResult<()> {
        let (listeners, event) = {
            let mut state = self.lock_state();
            state.counters.updates += 1;
            state.check_writable(partition)?;
            let item = state
                .partitions
                .get_mut(partition)
                .and_then(|data| data.items.iter_mut().find(|item| item.id == id))
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            patch.apply_to(item);
            state.commit(partition)
        };
        dispatch(&listeners, &event);
        Ok(())
    }

    fn delete(&self, partition: &str, id: &str) -> StoreResult<()> {
        let (listeners, event) = {
            let mut state = self.lock_state();
            state.counters.deletes += 1;
            state.check_writable(partition)?;
            let data = state
                .partitions
                .get_mut(partition)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let before = data.items.len();
            data.items.retain(|item| item.id != id);
            if data.items.len() == before {
                return Err(StoreError::NotFound(id.to_string()));
            }
            state.commit(partition)
        };
        dispatch(&listeners, &event);
        Ok(())
    }

    fn subscribe(
        &self,
        partition: &str,
        listener: StoreListener,
    ) -> StoreResult<StoreSubscriptionId> {
        let (id, initial) = {
            let mut state = self.lock_state();
            if !state.reachable {
                return Err(StoreError::Unavailable("memory store offline".to_string()));
            }
            if state.revoked.contains(partition) {
                return Err(StoreError::PermissionDenied(partition.to_string()));
            }
            let initial = state
                .partitions
                .get(partition)
                .map(PartitionData::snapshot)
                .unwrap_or_default();
            (state.listeners.add(partition, listener.clone()), initial)
        };
        debug!(
            "event=store_subscribe module=store status=ok store=memory listener_id={} version={}",
            id.0,
            initial.version()
        );
        listener(StoreEvent::Snapshot(initial));
        Ok(id)
    }

    fn unsubscribe(&self, id: StoreSubscriptionId) {
        if self.lock_state().listeners.remove(id) {
            debug!(
                "event=store_unsubscribe module=store status=ok store=memory listener_id={}",
                id.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRemoteStore;
    use crate::model::item::{ItemPatch, NewItem};
    use crate::store::{RemoteStore, StoreError, StoreEvent};
    use std::sync::{Arc, Mutex};

    fn new_item(text: &str) -> NewItem {
        NewItem::new(text).expect("valid text")
    }

    fn recording_listener() -> (Arc<Mutex<Vec<StoreEvent>>>, crate::store::StoreListener) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (
            events,
            Arc::new(move |event| sink.lock().expect("events lock").push(event)),
        )
    }

    #[test]
    fn writes_bump_version_and_push_full_snapshots() {
        let store = MemoryRemoteStore::new();
        let (events, listener) = recording_listener();
        store.subscribe("u1", listener).expect("subscribe");

        let id = store.create("u1", &new_item("one")).expect("create");
        store
            .update("u1", &id, &ItemPatch::done(true))
            .expect("update");

        let events = events.lock().expect("events lock");
        let versions: Vec<u64> = events
            .iter()
            .map(|event| match event {
                StoreEvent::Snapshot(snapshot) => snapshot.version(),
                StoreEvent::Failed(err) => panic!("unexpected failure: {err}"),
            })
            .collect();
        assert_eq!(versions, vec![0, 1, 2]);
        match events.last() {
            Some(StoreEvent::Snapshot(snapshot)) => {
                assert!(snapshot.find(&id).expect("item present").done)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn partitions_are_isolated() {
        let store = MemoryRemoteStore::new();
        store.create("u1", &new_item("mine")).expect("create");
        assert_eq!(store.items("u1").len(), 1);
        assert!(store.items("u2").is_empty());
        assert_eq!(store.version("u2"), 0);
    }

    #[test]
    fn missing_ids_report_not_found_without_version_bump() {
        let store = MemoryRemoteStore::new();
        store.create("u1", &new_item("one")).expect("create");

        let err = store.delete("u1", "ghost").expect_err("missing id");
        assert_eq!(err, StoreError::NotFound("ghost".to_string()));
        let err = store
            .update("u1", "ghost", &ItemPatch::done(true))
            .expect_err("missing id");
        assert_eq!(err, StoreError::NotFound("ghost".to_string()));
        assert_eq!(store.version("u1"), 1);
    }

    #[test]
    fn offline_store_rejects_writes_and_subscriptions() {
        let store = MemoryRemoteStore::new();
        store.set_reachable(false);
        assert!(matches!(
            store.create("u1", &new_item("x")),
            Err(StoreError::Unavailable(_))
        ));
        let (_, listener) = recording_listener();
        assert!(matches!(
            store.subscribe("u1", listener),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.counters().creates, 1);
    }

    #[test]
    fn queued_ids_are_used_in_order() {
        let store = MemoryRemoteStore::new();
        store.queue_ids(["abc", "def"]);
        assert_eq!(store.create("u1", &new_item("a")).expect("create"), "abc");
        assert_eq!(store.create("u1", &new_item("b")).expect("create"), "def");
        assert_ne!(store.create("u1", &new_item("c")).expect("create"), "abc");
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_delivery() {
        let store = Arc::new(MemoryRemoteStore::new());
        let slot: Arc<Mutex<Option<crate::store::StoreSubscriptionId>>> =
            Arc::new(Mutex::new(None));
        let store_ref = store.clone();
        let slot_ref = slot.clone();
        let id = store
            .subscribe(
                "u1",
                Arc::new(move |_| {
                    if let Some(id) = *slot_ref.lock().expect("slot lock") {
                        store_ref.unsubscribe(id);
                    }
                }),
            )
            .expect("subscribe");
        *slot.lock().expect("slot lock") = Some(id);

        store.create("u1", &new_item("x")).expect("create");
        assert_eq!(store.listener_count("u1"), 0);
    }
}
