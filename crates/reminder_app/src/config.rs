use std::path::PathBuf;

use reminder_domain::bookkeeping::DEFAULT_STORAGE_KEY;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub lookahead_days: u32,
    pub lead_minutes: u32,
    pub storage_key: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparsable or out-of-range values keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("REMINDER_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir.trim());
            }
        }
        if let Some(days) = lookup("REMINDER_LOOKAHEAD_DAYS") {
            match days.trim().parse::<u32>() {
                Ok(value) if value > 0 => config.lookahead_days = value,
                _ => warn!(value = %days, "ignoring invalid REMINDER_LOOKAHEAD_DAYS"),
            }
        }
        if let Some(lead) = lookup("REMINDER_LEAD_MINUTES") {
            match lead.trim().parse::<u32>() {
                Ok(value) => config.lead_minutes = value,
                Err(_) => warn!(value = %lead, "ignoring invalid REMINDER_LEAD_MINUTES"),
            }
        }
        if let Some(key) = lookup("REMINDER_STORAGE_KEY") {
            if !key.trim().is_empty() {
                config.storage_key = key.trim().to_string();
            }
        }
        config
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("alarms.json")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".reminders"),
            lookahead_days: 7,
            lead_minutes: 10,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}
