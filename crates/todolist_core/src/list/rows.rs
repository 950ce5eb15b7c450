use crate::model::item::{Item, ItemId};
use serde::Serialize;

/// One rendered list row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRow {
    pub id: ItemId,
    pub text: String,
    pub done: bool,
    /// Completed items render struck through and italic.
    pub struck_through: bool,
}

impl From<&Item> for ListRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            text: item.text.clone(),
            done: item.done,
            struck_through: item.done,
        }
    }
}
