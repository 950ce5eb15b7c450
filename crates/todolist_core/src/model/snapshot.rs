//! Versioned, immutable partition snapshots.

use crate::model::item::{Item, ItemId};
use std::sync::Arc;

/// Complete ordered listing of one partition at a given version.
///
/// Item order is the store order and is never re-sorted client-side.
/// Cloning is cheap: items are shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    items: Arc<[Item]>,
}

impl Snapshot {
    pub fn new(version: u64, items: Vec<Item>) -> Self {
        Self {
            version,
            items: items.into(),
        }
    }

    /// State before any delivery: version 0, no items.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Snapshot;
    use crate::model::item::Item;

    #[test]
    fn empty_snapshot_has_version_zero() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn find_and_ids_preserve_store_order() {
        let snapshot = Snapshot::new(
            3,
            vec![
                Item::new("b", "second created first", false),
                Item::new("a", "other", true),
            ],
        );
        assert_eq!(snapshot.ids(), vec!["b".to_string(), "a".to_string()]);
        assert!(snapshot.find("a").expect("present").done);
        assert!(!snapshot.contains("zzz"));
    }
}
