//! Single-writer, multi-reader snapshot cell with change notification.

use crate::exec::{Executor, InlineExecutor};
use crate::list::rows::ListRow;
use crate::locks::lock_or_recover;
use crate::model::item::Item;
use crate::model::snapshot::Snapshot;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Observer callback receiving each applied snapshot.
pub type SnapshotCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Handle returned by `ObservableList::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListSubscription(u64);

#[derive(Clone)]
struct Observer {
    handle: ListSubscription,
    executor: Arc<dyn Executor>,
    callback: SnapshotCallback,
}

struct ListState {
    snapshot: Snapshot,
    // `false` until the first `set` after construction or `clear`.
    loaded: bool,
    observers: Vec<Observer>,
}

/// Latest materialized item list, observable by any number of subscribers.
///
/// Callbacks run on the executor chosen at subscription time, in
/// subscription order. Inline callbacks must not call `set` or `clear` on the
/// same list.
pub struct ObservableList {
    state: Mutex<ListState>,
    // Keeps notification batches in the order their snapshots were applied.
    dispatch: Mutex<()>,
    next_handle: AtomicU64,
}

impl ObservableList {
    /// Creates an empty list (version 0, no items).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ListState {
                snapshot: Snapshot::empty(),
                loaded: false,
                observers: Vec::new(),
            }),
            dispatch: Mutex::new(()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Replaces the whole list with `snapshot` and notifies observers.
    ///
    /// Returns `false` (and notifies nobody) when `snapshot` is not newer
    /// than the currently applied one.
    pub fn set(&self, snapshot: Snapshot) -> bool {
        let _dispatch = lock_or_recover(&self.dispatch);
        let observers = {
            let mut state = lock_or_recover(&self.state);
            if state.loaded && snapshot.version() <= state.snapshot.version() {
                debug!(
                    "event=list_set module=list status=stale version={} current_version={}",
                    snapshot.version(),
                    state.snapshot.version()
                );
                return false;
            }
            state.snapshot = snapshot.clone();
            state.loaded = true;
            state.observers.clone()
        };
        debug!(
            "event=list_set module=list status=ok version={} items={} observers={}",
            snapshot.version(),
            snapshot.len(),
            observers.len()
        );
        notify(&observers, &snapshot);
        true
    }

    /// Resets to the empty initial state and notifies observers.
    pub fn clear(&self) {
        let _dispatch = lock_or_recover(&self.dispatch);
        let observers = {
            let mut state = lock_or_recover(&self.state);
            state.snapshot = Snapshot::empty();
            state.loaded = false;
            state.observers.clone()
        };
        notify(&observers, &Snapshot::empty());
    }

    /// Returns the currently applied snapshot.
    pub fn snapshot(&self) -> Snapshot {
        lock_or_recover(&self.state).snapshot.clone()
    }

    pub fn items(&self) -> Vec<Item> {
        self.snapshot().items().to_vec()
    }

    pub fn version(&self) -> u64 {
        lock_or_recover(&self.state).snapshot.version()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state).snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display rows for the current snapshot, in store order.
    pub fn rows(&self) -> Vec<ListRow> {
        self.snapshot().items().iter().map(ListRow::from).collect()
    }

    /// Registers a callback run inline on the thread that applies changes.
    pub fn subscribe(&self, callback: SnapshotCallback) -> ListSubscription {
        self.subscribe_on(Arc::new(InlineExecutor), callback)
    }

    /// Registers a callback run on `executor`.
    ///
    /// A callback added while a notification is in progress is first invoked
    /// for the next applied change.
    pub fn subscribe_on(
        &self,
        executor: Arc<dyn Executor>,
        callback: SnapshotCallback,
    ) -> ListSubscription {
        let handle = ListSubscription(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock_or_recover(&self.state).observers.push(Observer {
            handle,
            executor,
            callback,
        });
        handle
    }

    /// Removes an observer. Returns `false` for unknown handles.
    pub fn unsubscribe(&self, handle: ListSubscription) -> bool {
        let mut state = lock_or_recover(&self.state);
        let before = state.observers.len();
        state.observers.retain(|observer| observer.handle != handle);
        state.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        lock_or_recover(&self.state).observers.len()
    }
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(observers: &[Observer], snapshot: &Snapshot) {
    for observer in observers {
        let callback = observer.callback.clone();
        let snapshot = snapshot.clone();
        observer
            .executor
            .execute(Box::new(move || callback(&snapshot)));
    }
}
