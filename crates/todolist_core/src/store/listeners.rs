use super::{StoreListener, StoreSubscriptionId};
use crate::model::item::PartitionId;
use std::collections::BTreeMap;

/// Partition-keyed listener table shared by store implementations.
///
/// Iteration follows registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: BTreeMap<StoreSubscriptionId, (PartitionId, StoreListener)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, partition: &str, listener: StoreListener) -> StoreSubscriptionId {
        self.next_id += 1;
        let id = StoreSubscriptionId(self.next_id);
        self.entries.insert(id, (partition.to_string(), listener));
        id
    }

    pub(crate) fn remove(&mut self, id: StoreSubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn for_partition(&self, partition: &str) -> Vec<StoreListener> {
        self.entries
            .values()
            .filter(|(owner, _)| owner == partition)
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub(crate) fn count(&self, partition: &str) -> usize {
        self.entries
            .values()
            .filter(|(owner, _)| owner == partition)
            .count()
    }
}
