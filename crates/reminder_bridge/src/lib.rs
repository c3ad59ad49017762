use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, Utc};
use napi_derive::napi;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use reminder_domain::{
    routine::{RepeatPattern, Routine},
    ItemKind, NotificationRequest, NotificationScheduler, Registration,
};
use reminder_platform::{FileKeyValueStore, LocalNotificationCenter, PermissionPolicy};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOOKAHEAD_DAYS: u32 = 7;

#[napi(object)]
#[derive(Clone, Debug)]
pub struct ReminderBridgeConfig {
    pub data_dir: String,
    pub lookahead_days: Option<u32>,
    /// "granted", "denied" or "prompt" (default).
    pub permission: Option<String>,
}

#[napi(object)]
pub struct ScheduleParams {
    pub item_id: String,
    pub item_kind: String,
    pub title: String,
    pub body: String,
    /// Milliseconds since the Unix epoch.
    pub fire_at_ms: i64,
    pub is_recurring: Option<bool>,
    pub repeat_pattern: Option<String>,
}

#[napi(object)]
pub struct RoutineParams {
    pub id: String,
    pub title: String,
    pub note: Option<String>,
    /// `HH:MM` in the device's local time.
    pub time_of_day: String,
    /// `YYYY-MM-DD`; today when omitted.
    pub starts_on: Option<String>,
    pub pattern: String,
    /// Overrides the host timezone, in minutes east of UTC.
    pub utc_offset_minutes: Option<i32>,
}

struct BridgeState {
    scheduler: Arc<NotificationScheduler>,
    center: Arc<LocalNotificationCenter>,
    lookahead_days: u32,
}

static BRIDGE_STATE: Lazy<RwLock<Option<BridgeState>>> = Lazy::new(|| RwLock::new(None));

fn open_state(config: &ReminderBridgeConfig) -> Result<BridgeState> {
    let data_dir = PathBuf::from(&config.data_dir);
    let permission = match config.permission.as_deref().map(str::trim) {
        None | Some("") | Some("prompt") => PermissionPolicy::Prompt,
        Some("granted") => PermissionPolicy::Granted,
        Some("denied") => PermissionPolicy::Denied,
        Some(other) => return Err(anyhow!("unknown permission policy `{other}`")),
    };
    let center = Arc::new(
        LocalNotificationCenter::with_journal(data_dir.join("alarms.json"), permission)
            .context("failed to open alarm journal")?,
    );
    let store = Arc::new(
        FileKeyValueStore::open(data_dir.join("store.json"))
            .with_context(|| format!("failed to open store in {}", data_dir.display()))?,
    );
    let scheduler = NotificationScheduler::builder(center.clone(), store).build();
    Ok(BridgeState {
        scheduler: Arc::new(scheduler),
        center,
        lookahead_days: config
            .lookahead_days
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_LOOKAHEAD_DAYS),
    })
}

fn scheduler() -> Result<Arc<NotificationScheduler>> {
    BRIDGE_STATE
        .read()
        .as_ref()
        .map(|state| state.scheduler.clone())
        .context("reminder bridge is not configured")
}

fn parse_kind(raw: &str) -> Result<ItemKind> {
    raw.parse::<ItemKind>().map_err(anyhow::Error::from)
}

fn registrations_to_json(registrations: &[Registration]) -> Result<serde_json::Value> {
    Ok(json!({
        "count": registrations.len(),
        "notifications": serde_json::to_value(registrations)?,
    }))
}

#[napi]
pub fn ping() -> String {
    "reminder-bridge".to_owned()
}

#[napi]
pub fn configure(config: ReminderBridgeConfig) -> napi::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    let state = open_state(&config).map_err(to_napi_error)?;
    info!(data_dir = %config.data_dir, "reminder bridge configured");
    *BRIDGE_STATE.write() = Some(state);
    Ok(())
}

#[napi]
pub fn initialize() -> napi::Result<bool> {
    let scheduler = scheduler().map_err(to_napi_error)?;
    Ok(scheduler.initialize())
}

#[napi]
pub fn schedule_notification(params: ScheduleParams) -> napi::Result<bool> {
    let scheduler = scheduler().map_err(to_napi_error)?;
    let item_kind = parse_kind(&params.item_kind).map_err(to_napi_error)?;
    let fire_at = DateTime::<Utc>::from_timestamp_millis(params.fire_at_ms)
        .with_context(|| format!("fire time {} is out of range", params.fire_at_ms))
        .map_err(to_napi_error)?;
    Ok(scheduler.schedule_notification(
        &params.item_id,
        item_kind,
        &params.title,
        &params.body,
        fire_at,
        params.is_recurring.unwrap_or(false),
        params.repeat_pattern.as_deref(),
    ))
}

/// Reserves the routine's occurrences inside the lookahead window and
/// returns how many were scheduled.
#[napi]
pub fn schedule_routine(params: RoutineParams) -> napi::Result<u32> {
    let (scheduler, lookahead_days) = {
        let guard = BRIDGE_STATE.read();
        let state = guard
            .as_ref()
            .context("reminder bridge is not configured")
            .map_err(to_napi_error)?;
        (state.scheduler.clone(), state.lookahead_days)
    };
    let requests = routine_requests(&params, Utc::now(), lookahead_days).map_err(to_napi_error)?;
    let scheduled = scheduler
        .schedule_series(&params.id, ItemKind::Routine, &requests)
        .iter()
        .filter(|outcome| outcome.is_scheduled())
        .count();
    Ok(scheduled as u32)
}

fn routine_requests(
    params: &RoutineParams,
    now: DateTime<Utc>,
    lookahead_days: u32,
) -> Result<Vec<NotificationRequest>> {
    let time_of_day = NaiveTime::parse_from_str(params.time_of_day.trim(), "%H:%M")
        .with_context(|| format!("invalid time of day `{}`", params.time_of_day))?;
    let pattern: RepeatPattern = params.pattern.parse()?;
    let starts_on = match params.starts_on.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid start date `{raw}`"))?,
        None => now.with_timezone(&Local).date_naive(),
    };
    let routine = Routine {
        id: params.id.clone(),
        title: params.title.clone(),
        note: params.note.clone().unwrap_or_default(),
        time_of_day,
        starts_on,
        pattern,
    };
    Ok(match params.utc_offset_minutes {
        Some(minutes) => {
            let offset = FixedOffset::east_opt(minutes * 60)
                .with_context(|| format!("utc offset {minutes} minutes is out of range"))?;
            routine.reminder_requests(now, &offset, lookahead_days)
        }
        None => routine.reminder_requests(now, &Local, lookahead_days),
    })
}

#[napi]
pub fn cancel_notification(item_id: String, item_kind: String) -> napi::Result<bool> {
    let scheduler = scheduler().map_err(to_napi_error)?;
    let item_kind = parse_kind(&item_kind).map_err(to_napi_error)?;
    Ok(scheduler.cancel_notification(&item_id, item_kind))
}

#[napi]
pub fn cancel_all_notifications() -> napi::Result<bool> {
    let scheduler = scheduler().map_err(to_napi_error)?;
    Ok(scheduler.cancel_all_notifications())
}

#[napi]
pub fn get_scheduled_notifications(
    item_id: Option<String>,
    item_kind: Option<String>,
) -> napi::Result<serde_json::Value> {
    let scheduler = scheduler().map_err(to_napi_error)?;
    let item_kind = item_kind
        .as_deref()
        .map(parse_kind)
        .transpose()
        .map_err(to_napi_error)?;
    let registrations = scheduler.get_scheduled_notifications(item_id.as_deref(), item_kind);
    registrations_to_json(&registrations).map_err(to_napi_error)
}

/// Pops alarms whose trigger has passed so the host can present them.
#[napi]
pub fn take_due_notifications() -> napi::Result<serde_json::Value> {
    let center = BRIDGE_STATE
        .read()
        .as_ref()
        .map(|state| state.center.clone())
        .context("reminder bridge is not configured")
        .map_err(to_napi_error)?;
    let due = center.take_due(Utc::now()).map_err(to_napi_error)?;
    registrations_to_json(&due).map_err(to_napi_error)
}

fn to_napi_error(err: anyhow::Error) -> napi::Error {
    napi::Error::new(napi::Status::GenericFailure, err.to_string())
}
