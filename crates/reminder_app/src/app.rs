use std::fmt::Display;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reminder_domain::{
    routine::Routine, schedule::ScheduleEntry, ItemKind, NotificationScheduler, Registration,
    ScheduleOutcome,
};
use reminder_platform::{FileKeyValueStore, LocalNotificationCenter, PermissionPolicy};
use tracing::{debug, info};

use crate::config::AppConfig;

/// The scheduler wired to on-disk collaborators under `config.data_dir`.
pub struct Reminders {
    config: AppConfig,
    scheduler: NotificationScheduler,
    center: Arc<LocalNotificationCenter>,
}

impl Reminders {
    pub fn open(config: AppConfig, permission: PermissionPolicy) -> Result<Self> {
        let center = Arc::new(
            LocalNotificationCenter::with_journal(config.journal_path(), permission)
                .context("failed to open alarm journal")?,
        );
        let store = Arc::new(FileKeyValueStore::open(config.store_path()).with_context(|| {
            format!("failed to open store {}", config.store_path().display())
        })?);
        let scheduler = NotificationScheduler::builder(center.clone(), store)
            .with_storage_key(config.storage_key.clone())
            .build();
        debug!(data_dir = %config.data_dir.display(), "opened reminder data");
        Ok(Self {
            config,
            scheduler,
            center,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    pub fn init(&self) -> Result<()> {
        if !self.scheduler.initialize() {
            bail!("notification permission was not granted");
        }
        info!(
            reserved = self.scheduler.reserved_ids().len(),
            "reminders ready"
        );
        Ok(())
    }

    pub fn schedule_entry<Tz: TimeZone>(&self, entry: &ScheduleEntry, tz: &Tz) -> ScheduleOutcome
    where
        Tz::Offset: Display,
    {
        self.scheduler.schedule(&entry.reminder_request(tz))
    }

    pub fn schedule_routine<Tz: TimeZone>(
        &self,
        routine: &Routine,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Vec<ScheduleOutcome> {
        let requests = routine.reminder_requests(now, tz, self.config.lookahead_days);
        if requests.is_empty() {
            info!(routine = %routine.id, "no occurrences in lookahead window");
        }
        self.scheduler
            .schedule_series(&routine.id, ItemKind::Routine, &requests)
    }

    pub fn cancel(&self, item_id: &str, item_kind: ItemKind) -> bool {
        self.scheduler.cancel_notification(item_id, item_kind)
    }

    pub fn cancel_all(&self) -> bool {
        self.scheduler.cancel_all_notifications()
    }

    pub fn list(&self, item_id: Option<&str>, item_kind: Option<ItemKind>) -> Vec<Registration> {
        self.scheduler.get_scheduled_notifications(item_id, item_kind)
    }

    /// Pops alarms that should have fired by `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Registration>> {
        self.center.take_due(now)
    }
}

/// One line per registration: trigger, kind/item and title.
pub fn describe(registration: &Registration) -> String {
    let owner = registration
        .payload()
        .map(|data| format!("{}:{}", data.item_kind, data.item_id))
        .unwrap_or_else(|| "foreign".to_string());
    format!(
        "{}  {:<24}  {}",
        registration.trigger.format("%Y-%m-%d %H:%M UTC"),
        owner,
        registration.content.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use reminder_domain::ScheduleRejection;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            lookahead_days: 3,
            ..AppConfig::default()
        }
    }

    #[test]
    fn schedule_entry_then_reschedule_keeps_one_reminder() {
        let temp = tempdir().expect("tempdir");
        let reminders = Reminders::open(config(temp.path()), PermissionPolicy::Granted).unwrap();
        reminders.init().unwrap();

        let mut entry = ScheduleEntry {
            id: "dentist".into(),
            title: "Dentist".into(),
            starts_at: Utc::now() + Duration::days(2),
            location: Some("Clinic".into()),
            lead_minutes: 15,
        };
        assert!(reminders.schedule_entry(&entry, &Utc).is_scheduled());
        assert_eq!(
            reminders.schedule_entry(&entry, &Utc).rejection(),
            Some(ScheduleRejection::Duplicate)
        );

        entry.starts_at += Duration::hours(1);
        assert!(reminders.schedule_entry(&entry, &Utc).is_scheduled());
        let listed = reminders.list(Some("dentist"), Some(ItemKind::Schedule));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].trigger, entry.fire_at());
        assert!(describe(&listed[0]).contains("schedule:dentist"));
    }

    #[test]
    fn routine_reserves_each_occurrence_in_window() {
        let temp = tempdir().expect("tempdir");
        let reminders = Reminders::open(config(temp.path()), PermissionPolicy::Granted).unwrap();
        reminders.init().unwrap();

        let now = Utc::now();
        let routine = Routine {
            id: "water".into(),
            title: "Water plants".into(),
            note: String::new(),
            time_of_day: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            starts_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            pattern: "daily".parse().unwrap(),
        };
        let outcomes = reminders.schedule_routine(&routine, now, &Utc);
        assert!(!outcomes.is_empty());
        assert!(outcomes.iter().all(ScheduleOutcome::is_scheduled));
        assert_eq!(
            reminders.list(Some("water"), None).len(),
            outcomes.len()
        );

        assert!(reminders.cancel("water", ItemKind::Routine));
        assert!(reminders.list(None, None).is_empty());
    }

    #[test]
    fn routine_without_upcoming_times_drops_old_reminders() {
        let temp = tempdir().expect("tempdir");
        let reminders = Reminders::open(config(temp.path()), PermissionPolicy::Granted).unwrap();
        reminders.init().unwrap();

        let now = Utc::now();
        let mut routine = Routine {
            id: "yoga".into(),
            title: "Yoga".into(),
            note: String::new(),
            time_of_day: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            starts_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            pattern: "daily".parse().unwrap(),
        };
        assert!(!reminders.schedule_routine(&routine, now, &Utc).is_empty());

        routine.starts_on = (now + Duration::days(30)).date_naive();
        assert!(reminders.schedule_routine(&routine, now, &Utc).is_empty());
        assert!(reminders.list(Some("yoga"), Some(ItemKind::Routine)).is_empty());
        assert!(reminders.scheduler().reserved_ids().is_empty());
    }

    #[test]
    fn denied_permission_fails_init() {
        let temp = tempdir().expect("tempdir");
        let reminders = Reminders::open(config(temp.path()), PermissionPolicy::Denied).unwrap();
        assert!(reminders.init().is_err());
    }
}
