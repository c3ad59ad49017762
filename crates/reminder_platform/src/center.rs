use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reminder_domain::{
    notifications::{NotificationContent, PresentationPolicy},
    NotificationCenter, NotificationId, PlatformError, Registration,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// How the simulated user answers a permission prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionPolicy {
    Granted,
    Denied,
    /// Not yet asked; the first request is accepted.
    Prompt,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
    permission_granted: bool,
    registrations: Vec<Registration>,
}

#[derive(Debug)]
struct CenterState {
    permission_granted: bool,
    presentation: Option<PresentationPolicy>,
    registrations: BTreeMap<NotificationId, Registration>,
}

/// Alarm registry used on hosts without a native notification service.
///
/// With a journal path every mutation is written to disk, so pending alarms
/// outlive the process the way OS-held alarms do.
#[derive(Debug)]
pub struct LocalNotificationCenter {
    policy: PermissionPolicy,
    journal: Option<PathBuf>,
    state: RwLock<CenterState>,
}

impl LocalNotificationCenter {
    pub fn in_memory(policy: PermissionPolicy) -> Self {
        Self {
            policy,
            journal: None,
            state: RwLock::new(CenterState {
                permission_granted: policy == PermissionPolicy::Granted,
                presentation: None,
                registrations: BTreeMap::new(),
            }),
        }
    }

    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn with_journal(path: impl AsRef<Path>, policy: PermissionPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let journal = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Journal>(&raw)
                .with_context(|| format!("alarm journal `{}` is corrupt", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Journal::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("unable to read alarm journal `{}`", path.display()))
            }
        };
        debug!(
            pending = journal.registrations.len(),
            "loaded alarm journal"
        );
        let permission_granted = match policy {
            PermissionPolicy::Granted => true,
            PermissionPolicy::Denied => false,
            PermissionPolicy::Prompt => journal.permission_granted,
        };
        Ok(Self {
            policy,
            journal: Some(path),
            state: RwLock::new(CenterState {
                permission_granted,
                presentation: None,
                registrations: journal
                    .registrations
                    .into_iter()
                    .map(|registration| (registration.id.clone(), registration))
                    .collect(),
            }),
        })
    }

    pub fn presentation_policy(&self) -> Option<PresentationPolicy> {
        self.state.read().presentation
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().registrations.len()
    }

    /// Removes and returns every alarm whose trigger is at or before `now`,
    /// earliest first.
    #[instrument(skip(self))]
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Registration>> {
        let mut state = self.state.write();
        let due_ids: Vec<NotificationId> = state
            .registrations
            .values()
            .filter(|registration| registration.trigger <= now)
            .map(|registration| registration.id.clone())
            .collect();
        if due_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut due: Vec<Registration> = due_ids
            .iter()
            .filter_map(|id| state.registrations.remove(id))
            .collect();
        if let Err(err) = self.write_journal(&state) {
            for registration in due {
                state.registrations.insert(registration.id.clone(), registration);
            }
            return Err(err.context("unable to record delivered alarms"));
        }
        due.sort_by_key(|registration| registration.trigger);
        info!(count = due.len(), "delivering due notifications");
        Ok(due)
    }

    fn write_journal(&self, state: &CenterState) -> Result<()> {
        let Some(path) = &self.journal else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let journal = Journal {
            permission_granted: state.permission_granted,
            registrations: state.registrations.values().cloned().collect(),
        };
        let staging = path.with_extension("tmp");
        fs::write(&staging, serde_json::to_string_pretty(&journal)?)?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

impl NotificationCenter for LocalNotificationCenter {
    fn permission_granted(&self) -> Result<bool, PlatformError> {
        Ok(self.state.read().permission_granted)
    }

    fn request_permission(&self) -> Result<bool, PlatformError> {
        let mut state = self.state.write();
        if !state.permission_granted && self.policy == PermissionPolicy::Prompt {
            state.permission_granted = true;
            self.write_journal(&state)
                .map_err(|err| PlatformError::Permission(err.to_string()))?;
        }
        Ok(state.permission_granted)
    }

    fn set_presentation_policy(&self, policy: PresentationPolicy) {
        self.state.write().presentation = Some(policy);
    }

    fn register(
        &self,
        id: &NotificationId,
        content: NotificationContent,
        fire_at: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.write();
        if !state.permission_granted {
            return Err(PlatformError::Register {
                id: id.clone(),
                message: "notification permission not granted".into(),
            });
        }
        let previous = state.registrations.insert(
            id.clone(),
            Registration {
                id: id.clone(),
                content,
                trigger: fire_at,
            },
        );
        if let Err(err) = self.write_journal(&state) {
            match previous {
                Some(old) => state.registrations.insert(id.clone(), old),
                None => state.registrations.remove(id),
            };
            return Err(PlatformError::Register {
                id: id.clone(),
                message: err.to_string(),
            });
        }
        Ok(())
    }

    fn cancel(&self, id: &NotificationId) -> Result<(), PlatformError> {
        let mut state = self.state.write();
        if state.registrations.remove(id).is_some() {
            self.write_journal(&state)
                .map_err(|err| PlatformError::Cancel {
                    id: id.clone(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), PlatformError> {
        let mut state = self.state.write();
        state.registrations.clear();
        self.write_journal(&state)
            .map_err(|err| PlatformError::Unavailable(err.to_string()))
    }

    fn list_scheduled(&self) -> Result<Vec<Registration>, PlatformError> {
        let mut registrations: Vec<Registration> =
            self.state.read().registrations.values().cloned().collect();
        registrations.sort_by_key(|registration| registration.trigger);
        Ok(registrations)
    }
}
