use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    bookkeeping::{Bookkeeping, DEFAULT_STORAGE_KEY},
    item::{ItemKind, NotificationId, NotificationRequest},
    notifications::{
        NotificationCenter, NotificationContent, PlatformError, PresentationPolicy, Registration,
    },
    storage::KeyValueStore,
};

/// Source of "now" for fire-time validation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub storage_key: String,
    pub presentation: PresentationPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            presentation: PresentationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRejection {
    PermissionDenied,
    PastFireTime,
    Duplicate,
    PlatformFailure,
    /// A series named more than one item.
    MixedSeries,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(NotificationId),
    Rejected(ScheduleRejection),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    pub fn rejection(&self) -> Option<ScheduleRejection> {
        match self {
            Self::Scheduled(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

type ItemKey = (String, ItemKind);

pub struct NotificationScheduler {
    center: Arc<dyn NotificationCenter>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    bookkeeping: Mutex<Bookkeeping>,
    item_locks: Mutex<HashMap<ItemKey, Arc<Mutex<()>>>>,
}

pub struct NotificationSchedulerBuilder {
    center: Arc<dyn NotificationCenter>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl NotificationSchedulerBuilder {
    pub fn new(center: Arc<dyn NotificationCenter>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            center,
            store,
            clock: Arc::new(SystemClock),
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage_key = key.into();
        self
    }

    pub fn build(self) -> NotificationScheduler {
        NotificationScheduler {
            center: self.center,
            store: self.store,
            clock: self.clock,
            config: self.config,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            bookkeeping: Mutex::new(Bookkeeping::default()),
            item_locks: Mutex::new(HashMap::new()),
        }
    }
}

impl NotificationScheduler {
    pub fn builder(
        center: Arc<dyn NotificationCenter>,
        store: Arc<dyn KeyValueStore>,
    ) -> NotificationSchedulerBuilder {
        NotificationSchedulerBuilder::new(center, store)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ids currently held in the bookkeeping set.
    pub fn reserved_ids(&self) -> Vec<NotificationId> {
        self.bookkeeping.lock().ids()
    }

    /// Obtains permission, installs the presentation policy and restores
    /// bookkeeping. Returns `false` when permission is not granted.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> bool {
        if self.is_initialized() {
            return true;
        }
        let _guard = self.init_lock.lock();
        if self.is_initialized() {
            return true;
        }

        if !self.ensure_permission() {
            return false;
        }

        self.center.set_presentation_policy(self.config.presentation);

        match Bookkeeping::load(self.store.as_ref(), &self.config.storage_key) {
            Ok(loaded) => {
                debug!(count = loaded.len(), "restored notification bookkeeping");
                *self.bookkeeping.lock() = loaded;
            }
            Err(err) => {
                warn!(%err, "unable to restore notification bookkeeping; keeping in-memory state");
            }
        }
        self.reconcile();

        self.initialized.store(true, Ordering::Release);
        info!("notification scheduler initialized");
        true
    }

    /// Boolean form of [`Self::schedule`].
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_notification(
        &self,
        item_id: &str,
        item_kind: ItemKind,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
        is_recurring: bool,
        repeat_pattern: Option<&str>,
    ) -> bool {
        let request = NotificationRequest {
            item_id: item_id.to_string(),
            item_kind,
            title: title.to_string(),
            body: body.to_string(),
            fire_at,
            is_recurring,
            repeat_pattern: repeat_pattern.map(str::to_string),
        };
        self.schedule(&request).is_scheduled()
    }

    /// Replaces whatever is reserved for the request's item with one
    /// reservation at `request.fire_at`.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, item_kind = %request.item_kind))]
    pub fn schedule(&self, request: &NotificationRequest) -> ScheduleOutcome {
        if !self.initialize() {
            warn!("notification permission not granted; reminder dropped");
            return ScheduleOutcome::Rejected(ScheduleRejection::PermissionDenied);
        }

        let item_lock = self.item_lock(&request.item_id, request.item_kind);
        let _item_guard = item_lock.lock();

        let id = request.notification_id();
        let sole_reservation = {
            let book = self.bookkeeping.lock();
            book.contains(&id) && book.item_count(&request.item_id, request.item_kind) == 1
        };
        if sole_reservation {
            debug!(%id, "reminder already reserved");
            return ScheduleOutcome::Rejected(ScheduleRejection::Duplicate);
        }

        if let Err(err) = self.cancel_item(&request.item_id, request.item_kind) {
            warn!(%err, "unable to clear previous reminders before rescheduling");
        }

        self.reserve(request, id)
    }

    /// Replaces whatever was reserved for `(item_id, item_kind)` with one
    /// reservation per request. Every request must target that item; an
    /// empty slice leaves the item with no reminders.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub fn schedule_series(
        &self,
        item_id: &str,
        item_kind: ItemKind,
        requests: &[NotificationRequest],
    ) -> Vec<ScheduleOutcome> {
        if let Some(stray) = requests
            .iter()
            .find(|r| r.item_id != item_id || r.item_kind != item_kind)
        {
            warn!(
                found = %stray.item_id,
                found_kind = %stray.item_kind,
                "series mixes items; nothing scheduled"
            );
            return vec![ScheduleOutcome::Rejected(ScheduleRejection::MixedSeries); requests.len()];
        }
        if !self.initialize() {
            warn!("notification permission not granted; series dropped");
            return vec![ScheduleOutcome::Rejected(ScheduleRejection::PermissionDenied); requests.len()];
        }

        let item_lock = self.item_lock(item_id, item_kind);
        let _item_guard = item_lock.lock();

        if let Err(err) = self.cancel_item(item_id, item_kind) {
            warn!(%err, "unable to clear previous series before rescheduling");
        }

        requests
            .iter()
            .map(|request| {
                let id = request.notification_id();
                if self.bookkeeping.lock().contains(&id) {
                    ScheduleOutcome::Rejected(ScheduleRejection::Duplicate)
                } else {
                    self.reserve(request, id)
                }
            })
            .collect()
    }

    /// Cancels every reminder of one item. Succeeds when none exist.
    #[instrument(skip(self))]
    pub fn cancel_notification(&self, item_id: &str, item_kind: ItemKind) -> bool {
        let item_lock = self.item_lock(item_id, item_kind);
        let _item_guard = item_lock.lock();
        match self.cancel_item(item_id, item_kind) {
            Ok(cancelled) => {
                debug!(cancelled, "cancelled item reminders");
                true
            }
            Err(err) => {
                warn!(%err, "failed to cancel item reminders");
                false
            }
        }
    }

    /// Cancels everything the platform holds, including registrations this
    /// scheduler did not make.
    #[instrument(skip(self))]
    pub fn cancel_all_notifications(&self) -> bool {
        if let Err(err) = self.center.cancel_all() {
            warn!(%err, "failed to cancel all notifications");
            return false;
        }
        let mut book = self.bookkeeping.lock();
        book.clear();
        self.persist(&book);
        info!("cancelled all notifications");
        true
    }

    /// Platform listing filtered by item id and/or kind. Empty on failure.
    pub fn get_scheduled_notifications(
        &self,
        item_id: Option<&str>,
        item_kind: Option<ItemKind>,
    ) -> Vec<Registration> {
        match self.center.list_scheduled() {
            Ok(registrations) => registrations
                .into_iter()
                .filter(|registration| registration.matches(item_id, item_kind))
                .collect(),
            Err(err) => {
                warn!(%err, "failed to list scheduled notifications");
                Vec::new()
            }
        }
    }

    /// Rebuilds bookkeeping from the platform listing. Keeps the current set
    /// when the listing fails.
    #[instrument(skip(self))]
    pub fn reconcile(&self) -> bool {
        let registrations = match self.center.list_scheduled() {
            Ok(registrations) => registrations,
            Err(err) => {
                warn!(%err, "unable to reconcile bookkeeping with platform");
                return false;
            }
        };
        let owned = registrations
            .into_iter()
            .filter(|registration| registration.payload().is_some())
            .map(|registration| registration.id);

        let mut book = self.bookkeeping.lock();
        let before = book.len();
        book.replace(owned);
        if book.len() != before {
            debug!(before, after = book.len(), "bookkeeping reconciled");
        }
        self.persist(&book);
        true
    }

    fn ensure_permission(&self) -> bool {
        match self.center.permission_granted() {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => warn!(%err, "unable to read notification permission"),
        }
        match self.center.request_permission() {
            Ok(true) => true,
            Ok(false) => {
                warn!("notification permission denied");
                false
            }
            Err(err) => {
                warn!(%err, "notification permission request failed");
                false
            }
        }
    }

    /// Caller must hold the item lock.
    fn reserve(&self, request: &NotificationRequest, id: NotificationId) -> ScheduleOutcome {
        if request.fire_at <= self.clock.now() {
            info!(fire_at = %request.fire_at, "fire time is not in the future; reminder skipped");
            return ScheduleOutcome::Rejected(ScheduleRejection::PastFireTime);
        }

        let content = NotificationContent::for_request(request);
        if let Err(err) = self.center.register(&id, content, request.fire_at) {
            warn!(%err, "notification registration failed");
            return ScheduleOutcome::Rejected(ScheduleRejection::PlatformFailure);
        }

        let mut book = self.bookkeeping.lock();
        book.insert(id.clone());
        self.persist(&book);
        debug!(%id, fire_at = %request.fire_at, "reminder scheduled");
        ScheduleOutcome::Scheduled(id)
    }

    /// Caller must hold the item lock. Cancellations done before a failure
    /// stay done and are persisted.
    fn cancel_item(
        &self,
        item_id: &str,
        item_kind: ItemKind,
    ) -> Result<usize, PlatformError> {
        let targets: Vec<NotificationId> = self
            .center
            .list_scheduled()?
            .into_iter()
            .filter(|registration| registration.matches(Some(item_id), Some(item_kind)))
            .map(|registration| registration.id)
            .collect();

        let mut cancelled = Vec::with_capacity(targets.len());
        let mut failure = None;
        for id in targets {
            match self.center.cancel(&id) {
                Ok(()) => cancelled.push(id),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let mut book = self.bookkeeping.lock();
        for id in &cancelled {
            book.remove(id);
        }
        if failure.is_none() {
            book.remove_item(item_id, item_kind);
        }
        self.persist(&book);

        match failure {
            Some(err) => Err(err),
            None => Ok(cancelled.len()),
        }
    }

    fn persist(&self, book: &Bookkeeping) {
        if let Err(err) = book.save(self.store.as_ref(), &self.config.storage_key) {
            warn!(%err, "unable to persist notification bookkeeping");
        }
    }

    fn item_lock(&self, item_id: &str, item_kind: ItemKind) -> Arc<Mutex<()>> {
        let mut locks = self.item_locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((item_id.to_string(), item_kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_helpers_report_rejection() {
        let ok = ScheduleOutcome::Scheduled(NotificationId::from_raw("schedule_a_1"));
        assert!(ok.is_scheduled());
        assert_eq!(ok.rejection(), None);

        let dup = ScheduleOutcome::Rejected(ScheduleRejection::Duplicate);
        assert!(!dup.is_scheduled());
        assert_eq!(dup.rejection(), Some(ScheduleRejection::Duplicate));
    }

    #[test]
    fn default_config_uses_scheduled_notifications_key() {
        let config = SchedulerConfig::default();
        assert_eq!(config.storage_key, "scheduledNotifications");
        assert!(config.presentation.show_alert);
        assert!(config.presentation.play_sound);
        assert!(!config.presentation.set_badge);
    }
}
