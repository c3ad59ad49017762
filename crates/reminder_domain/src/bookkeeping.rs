use std::collections::BTreeSet;

use crate::item::{ItemKind, NotificationId};
use crate::storage::{KeyValueStore, StoreError};

pub const DEFAULT_STORAGE_KEY: &str = "scheduledNotifications";

/// Ids the scheduler believes are registered with the platform.
///
/// Persisted as a JSON array of id strings under a single key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookkeeping {
    ids: BTreeSet<NotificationId>,
}

impl Bookkeeping {
    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: NotificationId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &NotificationId) -> bool {
        self.ids.remove(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<NotificationId> {
        self.ids.iter().cloned().collect()
    }

    /// How many ids are reserved for `(item_id, kind)`.
    pub fn item_count(&self, item_id: &str, kind: ItemKind) -> usize {
        self.ids.iter().filter(|id| id.belongs_to(item_id, kind)).count()
    }

    /// Drops every id derived for `(item_id, kind)` and returns how many went.
    pub fn remove_item(&mut self, item_id: &str, kind: ItemKind) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| !id.belongs_to(item_id, kind));
        before - self.ids.len()
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = NotificationId>) {
        self.ids = ids.into_iter().collect();
    }

    /// Reads the persisted set. A missing key yields an empty set.
    pub fn load(store: &dyn KeyValueStore, key: &str) -> Result<Self, StoreError> {
        let Some(raw) = store.get(key)? else {
            return Ok(Self::default());
        };
        let ids: Vec<NotificationId> = serde_json::from_str(&raw)?;
        Ok(Self {
            ids: ids.into_iter().collect(),
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore, key: &str) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.ids)?;
        store.set(key, &raw)
    }
}
