//! Host-side collaborators for the reminder scheduler: key-value stores and
//! a local notification center that keeps its alarms in a JSON journal.

pub mod center;
pub mod store;

pub use crate::center::{LocalNotificationCenter, PermissionPolicy};
pub use crate::store::{FileKeyValueStore, MemoryKeyValueStore};
