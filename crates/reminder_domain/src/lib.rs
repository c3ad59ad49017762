pub mod bookkeeping;
pub mod item;
pub mod notifications;
pub mod routine;
pub mod schedule;
pub mod service;
pub mod storage;

pub use crate::item::{ItemKind, NotificationId, NotificationRequest};
pub use crate::notifications::{NotificationCenter, PlatformError, Registration};
pub use crate::service::{
    NotificationScheduler, NotificationSchedulerBuilder, ScheduleOutcome, ScheduleRejection,
};
pub use crate::storage::{KeyValueStore, StoreError};
