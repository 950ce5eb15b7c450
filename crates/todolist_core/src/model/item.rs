//! To-do item records and write payloads.
//!
//! # Responsibility
//! - Define the canonical `Item` read shape.
//! - Validate create input before it reaches any store.
//!
//! # Invariants
//! - `NewItem::text` is trimmed and never empty.
//! - `ItemPatch` can only carry the `done` flag.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque item identifier assigned by the remote store on creation.
pub type ItemId = String;

/// Identifier of one user partition (the owning principal id).
pub type PartitionId = String;

/// One to-do entry as observed in a partition snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, text: impl Into<String>, done: bool) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            done,
        }
    }
}

/// Validation errors for item write payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    EmptyText,
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "item text must not be empty"),
        }
    }
}

impl Error for ItemValidationError {}

/// Create payload handed to `RemoteStore::create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub text: String,
    pub done: bool,
}

impl NewItem {
    /// Builds a create payload with `done = false`.
    ///
    /// Surrounding whitespace is trimmed; whitespace-only input is rejected.
    pub fn new(text: &str) -> Result<Self, ItemValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ItemValidationError::EmptyText);
        }
        Ok(Self {
            text: trimmed.to_string(),
            done: false,
        })
    }

    /// Materializes the payload into a record once the store assigned an id.
    pub fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            text: self.text,
            done: self.done,
        }
    }
}

/// Partial update payload handed to `RemoteStore::update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl ItemPatch {
    pub fn done(done: bool) -> Self {
        Self { done: Some(done) }
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_none()
    }

    /// Applies set fields onto `item` in place.
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(done) = self.done {
            item.done = done;
        }
    }
}
