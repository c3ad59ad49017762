use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{ItemKind, NotificationRequest};

/// A dated appointment from the schedule feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
    /// Minutes before `starts_at` the reminder fires.
    pub lead_minutes: u32,
}

impl ScheduleEntry {
    pub fn fire_at(&self) -> DateTime<Utc> {
        self.starts_at - Duration::minutes(i64::from(self.lead_minutes))
    }

    /// Builds the one-shot reminder for this entry, formatting times in `tz`.
    pub fn reminder_request<Tz: TimeZone>(&self, tz: &Tz) -> NotificationRequest
    where
        Tz::Offset: std::fmt::Display,
    {
        let when = if self.lead_minutes == 0 {
            "Starting now".to_string()
        } else {
            format!(
                "Starts {} ({} min)",
                self.starts_at.with_timezone(tz).format("%a %H:%M"),
                self.lead_minutes
            )
        };
        let body = match self.location.as_deref().map(str::trim) {
            Some(location) if !location.is_empty() => format!("{when} at {location}"),
            _ => when,
        };
        NotificationRequest::new(
            self.id.clone(),
            ItemKind::Schedule,
            self.title.clone(),
            body,
            self.fire_at(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn entry(lead_minutes: u32, location: Option<&str>) -> ScheduleEntry {
        ScheduleEntry {
            id: "dentist".into(),
            title: "Dentist".into(),
            starts_at: Utc.with_ymd_and_hms(2025, 11, 7, 14, 0, 0).unwrap(),
            location: location.map(str::to_string),
            lead_minutes,
        }
    }

    #[test]
    fn reminder_fires_lead_minutes_before_start() {
        let request = entry(15, None).reminder_request(&Utc);
        assert_eq!(request.item_kind, ItemKind::Schedule);
        assert_eq!(
            request.fire_at,
            Utc.with_ymd_and_hms(2025, 11, 7, 13, 45, 0).unwrap()
        );
        assert!(!request.is_recurring);
        assert_eq!(request.body, "Starts Fri 14:00 (15 min)");
    }

    #[test]
    fn body_uses_local_time_and_location() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let request = entry(30, Some("Room 3")).reminder_request(&tz);
        assert_eq!(request.body, "Starts Fri 23:00 (30 min) at Room 3");

        let immediate = entry(0, Some("  "));
        let request = immediate.reminder_request(&Utc);
        assert_eq!(request.body, "Starting now");
        assert_eq!(request.fire_at, immediate.starts_at);
    }
}
