use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{ItemKind, NotificationId, NotificationRequest};

/// How a notification is presented while the app is in the foreground.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationPolicy {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
}

impl Default for PresentationPolicy {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: true,
            set_badge: false,
        }
    }
}

/// Payload attached to every registration made by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationData {
    pub item_id: String,
    pub item_kind: ItemKind,
    pub fire_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub repeat_pattern: Option<String>,
}

impl From<&NotificationRequest> for NotificationData {
    fn from(request: &NotificationRequest) -> Self {
        Self {
            item_id: request.item_id.clone(),
            item_kind: request.item_kind,
            fire_at: request.fire_at,
            is_recurring: request.is_recurring,
            repeat_pattern: request.repeat_pattern.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Opaque to the platform. Registrations made by other code may carry
    /// anything here.
    pub data: serde_json::Value,
}

impl NotificationContent {
    pub fn for_request(request: &NotificationRequest) -> Self {
        let data = serde_json::to_value(NotificationData::from(request))
            .unwrap_or(serde_json::Value::Null);
        Self {
            title: request.title.clone(),
            body: request.body.clone(),
            data,
        }
    }
}

/// One entry of the platform's scheduled-notification listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    pub id: NotificationId,
    pub content: NotificationContent,
    pub trigger: DateTime<Utc>,
}

impl Registration {
    /// Decodes the payload when the registration was made by the scheduler.
    pub fn payload(&self) -> Option<NotificationData> {
        serde_json::from_value(self.content.data.clone()).ok()
    }

    pub fn matches(&self, item_id: Option<&str>, item_kind: Option<ItemKind>) -> bool {
        if item_id.is_none() && item_kind.is_none() {
            return true;
        }
        let Some(data) = self.payload() else {
            return false;
        };
        item_id.map_or(true, |id| data.item_id == id)
            && item_kind.map_or(true, |kind| data.item_kind == kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("notification permission request failed: {0}")]
    Permission(String),
    #[error("notification `{id}` could not be registered: {message}")]
    Register { id: NotificationId, message: String },
    #[error("notification `{id}` could not be cancelled: {message}")]
    Cancel { id: NotificationId, message: String },
    #[error("notification platform call failed: {0}")]
    Unavailable(String),
}

/// The OS-level local notification facility.
///
/// Implementations block until the platform call completes.
pub trait NotificationCenter: Send + Sync {
    fn permission_granted(&self) -> Result<bool, PlatformError>;
    fn request_permission(&self) -> Result<bool, PlatformError>;
    fn set_presentation_policy(&self, policy: PresentationPolicy);
    fn register(
        &self,
        id: &NotificationId,
        content: NotificationContent,
        fire_at: DateTime<Utc>,
    ) -> Result<(), PlatformError>;
    fn cancel(&self, id: &NotificationId) -> Result<(), PlatformError>;
    fn cancel_all(&self) -> Result<(), PlatformError>;
    fn list_scheduled(&self) -> Result<Vec<Registration>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn registration(data: serde_json::Value) -> Registration {
        Registration {
            id: NotificationId::from_raw("x"),
            content: NotificationContent {
                title: "t".into(),
                body: "b".into(),
                data,
            },
            trigger: Utc.with_ymd_and_hms(2025, 11, 7, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn payload_round_trips_through_content() {
        let request = NotificationRequest::new(
            "r-1",
            ItemKind::Routine,
            "Stretch",
            "Time to stretch",
            Utc.with_ymd_and_hms(2025, 11, 7, 6, 30, 0).unwrap(),
        )
        .recurring(Some("daily".into()));
        let content = NotificationContent::for_request(&request);
        let reg = registration(content.data);
        let data = reg.payload().expect("payload decodes");
        assert_eq!(data.item_id, "r-1");
        assert_eq!(data.item_kind, ItemKind::Routine);
        assert_eq!(data.repeat_pattern.as_deref(), Some("daily"));
        assert!(data.is_recurring);
    }

    #[test]
    fn foreign_payload_only_matches_unfiltered_queries() {
        let reg = registration(json!({ "campaign": "promo" }));
        assert!(reg.matches(None, None));
        assert!(!reg.matches(Some("promo"), None));
        assert!(!reg.matches(None, Some(ItemKind::Schedule)));
    }
}
