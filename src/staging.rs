//! In-memory staging queue.
//!
//! Items wait here, in insertion order, until a batch consumes them. The
//! queue hands out shared references only, so an item's content cannot
//! change after insertion; only its status moves.

use crate::models::{InputKind, ItemStatus, StagedItem};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct StagingQueue {
    items: Vec<StagedItem>,
}

impl StagingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new item. An empty `name` falls back to the kind's default label.
    pub fn add(&mut self, kind: InputKind, content: String, name: &str) -> StagedItem {
        let name = if name.trim().is_empty() {
            kind.default_name().to_string()
        } else {
            name.to_string()
        };

        let item = StagedItem {
            id: Uuid::new_v4().to_string(),
            kind,
            content,
            name,
            status: ItemStatus::Queued,
        };

        debug!("Staged {} item {} ({})", item.kind, item.id, item.name);
        self.items.push(item.clone());
        item
    }

    /// Remove one item. Unknown ids are ignored.
    #[allow(dead_code)]
    pub fn remove(&mut self, id: &str) {
        self.items.retain(|item| item.id != id);
    }

    /// Remove every item whose id is in `ids`.
    pub fn remove_many(&mut self, ids: &[String]) {
        self.items.retain(|item| !ids.contains(&item.id));
    }

    pub fn list(&self) -> &[StagedItem] {
        &self.items
    }

    #[allow(dead_code)]
    pub fn get(&self, id: &str) -> Option<&StagedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn set_status(&mut self, id: &str, status: ItemStatus) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.status = status;
        }
    }

    #[allow(dead_code)]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
