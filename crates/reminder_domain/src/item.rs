use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two reminder-bearing record kinds of the app.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Schedule,
    Routine,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Routine => "routine",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = UnknownItemKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "schedule" => Ok(Self::Schedule),
            "routine" => Ok(Self::Routine),
            other => Err(UnknownItemKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item kind `{0}`; expected schedule|routine")]
pub struct UnknownItemKind(pub String);

/// A reminder a domain feature wants presented at `fire_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub item_id: String,
    pub item_kind: ItemKind,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub repeat_pattern: Option<String>,
}

impl NotificationRequest {
    pub fn new(
        item_id: impl Into<String>,
        item_kind: ItemKind,
        title: impl Into<String>,
        body: impl Into<String>,
        fire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_kind,
            title: title.into(),
            body: body.into(),
            fire_at,
            is_recurring: false,
            repeat_pattern: None,
        }
    }

    pub fn recurring(mut self, repeat_pattern: Option<String>) -> Self {
        self.is_recurring = true;
        self.repeat_pattern = repeat_pattern;
        self
    }

    pub fn notification_id(&self) -> NotificationId {
        NotificationId::derive(self.item_kind, &self.item_id, self.fire_at)
    }
}

/// Deterministic registration key for one `(kind, item, fire time)` tuple.
///
/// Layout is `{kind}_{item_id}_{hash}` where `hash` is base-36 and never
/// contains `_`, so the item id can be recovered from the tail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn derive(kind: ItemKind, item_id: &str, fire_at: DateTime<Utc>) -> Self {
        let seed = format!("{}_{}_{}", item_id, kind, fire_at.timestamp_millis());
        Self(format!("{}_{}_{}", kind, item_id, short_hash(&seed)))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was derived for `(item_id, kind)`, whatever its fire time.
    pub fn belongs_to(&self, item_id: &str, kind: ItemKind) -> bool {
        let Some(rest) = self
            .0
            .strip_prefix(kind.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            return false;
        };
        rest.rsplit_once('_')
            .map(|(owner, _)| owner == item_id)
            .unwrap_or(false)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32-bit rolling hash (`h * 31 + c`) over UTF-16 code units, rendered in
/// base 36. Ids match those produced by the app's JS layer.
fn short_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    to_base36(hash.unsigned_abs())
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 7, hour, 0, 0).unwrap()
    }

    #[test]
    fn derive_is_deterministic() {
        let a = NotificationId::derive(ItemKind::Routine, "r-1", at(9));
        let b = NotificationId::derive(ItemKind::Routine, "r-1", at(9));
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("routine_r-1_"));
    }

    #[test]
    fn different_fire_times_and_kinds_produce_distinct_ids() {
        let base = at(6);
        let mut seen = HashSet::new();
        for kind in [ItemKind::Schedule, ItemKind::Routine] {
            for item in ["a", "b", "c"] {
                for minutes in 0..120 {
                    let id = NotificationId::derive(kind, item, base + Duration::minutes(minutes));
                    assert!(seen.insert(id), "collision at {kind}/{item}/+{minutes}m");
                }
            }
        }
    }

    #[test]
    fn belongs_to_handles_underscored_item_ids() {
        let id = NotificationId::derive(ItemKind::Schedule, "team_sync", at(10));
        assert!(id.belongs_to("team_sync", ItemKind::Schedule));
        assert!(!id.belongs_to("team", ItemKind::Schedule));
        assert!(!id.belongs_to("team_sync", ItemKind::Routine));
    }

    #[test]
    fn item_kind_parses_case_insensitively() {
        assert_eq!("ROUTINE".parse::<ItemKind>().unwrap(), ItemKind::Routine);
        assert!("diary".parse::<ItemKind>().is_err());
    }

    #[test]
    fn base36_renders_zero_and_max() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(u32::MAX), "1z141z3");
    }

    #[test]
    fn hash_runs_over_utf16_units() {
        assert_eq!(short_hash("abc"), "22ci");
        // Surrogate pair 0xD83D 0xDE00, not the scalar U+1F600.
        assert_eq!(short_hash("\u{1F600}"), "11zz7");
    }
}
