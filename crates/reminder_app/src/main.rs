use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reminder_app::{app::describe, AppConfig, Reminders};
use reminder_domain::{routine::Routine, schedule::ScheduleEntry, ItemKind};
use reminder_platform::PermissionPolicy;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "remindctl",
    version,
    about = "Manage local reminders"
)]
struct Cli {
    /// Directory holding the reminder store and alarm journal
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bookkeeping key inside the store
    #[arg(long)]
    storage_key: Option<String>,

    /// Days of routine occurrences to reserve ahead
    #[arg(long)]
    lookahead_days: Option<u32>,

    /// How the permission prompt is answered
    #[arg(long, value_enum, default_value = "prompt")]
    permission: Permission,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Permission {
    Granted,
    Denied,
    Prompt,
}

impl From<Permission> for PermissionPolicy {
    fn from(value: Permission) -> Self {
        match value {
            Permission::Granted => PermissionPolicy::Granted,
            Permission::Denied => PermissionPolicy::Denied,
            Permission::Prompt => PermissionPolicy::Prompt,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Request permission and restore bookkeeping
    Init,
    /// Remind ahead of a dated appointment
    Schedule {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        /// Start time, RFC 3339 (e.g. 2025-11-07T14:00:00+01:00)
        #[arg(long)]
        at: String,
        #[arg(long)]
        location: Option<String>,
        /// Minutes before the start to fire
        #[arg(long)]
        lead_minutes: Option<u32>,
    },
    /// Reserve the upcoming occurrences of a routine
    Routine {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        note: String,
        /// Local time of day, HH:MM
        #[arg(long)]
        time: String,
        /// daily, weekdays, weekends, mon,wed,fri or +2d
        #[arg(long)]
        pattern: String,
        /// First day of the routine, YYYY-MM-DD (default today)
        #[arg(long)]
        starts_on: Option<String>,
    },
    /// Cancel every reminder of one item
    Cancel {
        #[arg(long)]
        id: String,
        #[arg(long)]
        kind: ItemKind,
    },
    /// Cancel every reminder
    CancelAll,
    /// List pending reminders
    List {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        kind: Option<ItemKind>,
    },
    /// Deliver reminders whose time has passed
    Due,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(key) = cli.storage_key {
        config.storage_key = key;
    }
    if let Some(days) = cli.lookahead_days.filter(|days| *days > 0) {
        config.lookahead_days = days;
    }

    let reminders = Reminders::open(config, cli.permission.into())?;
    run(&reminders, cli.command)
}

fn run(reminders: &Reminders, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            reminders.init()?;
            println!(
                "ready; {} reminder(s) reserved",
                reminders.scheduler().reserved_ids().len()
            );
        }
        Command::Schedule {
            id,
            title,
            at,
            location,
            lead_minutes,
        } => {
            let starts_at = DateTime::parse_from_rfc3339(&at)
                .with_context(|| format!("invalid start time `{at}`"))?
                .with_timezone(&Utc);
            let entry = ScheduleEntry {
                id,
                title,
                starts_at,
                location,
                lead_minutes: lead_minutes.unwrap_or(reminders.config().lead_minutes),
            };
            match reminders.schedule_entry(&entry, &Local) {
                outcome if outcome.is_scheduled() => {
                    println!("scheduled for {}", entry.fire_at().with_timezone(&Local))
                }
                outcome => bail!("not scheduled: {:?}", outcome.rejection()),
            }
        }
        Command::Routine {
            id,
            title,
            note,
            time,
            pattern,
            starts_on,
        } => {
            let now = Utc::now();
            let time_of_day = NaiveTime::parse_from_str(time.trim(), "%H:%M")
                .with_context(|| format!("invalid time of day `{time}`"))?;
            let starts_on = match starts_on {
                Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .with_context(|| format!("invalid start date `{raw}`"))?,
                None => now.with_timezone(&Local).date_naive(),
            };
            let routine = Routine {
                id,
                title,
                note,
                time_of_day,
                starts_on,
                pattern: pattern.parse()?,
            };
            let outcomes = reminders.schedule_routine(&routine, now, &Local);
            let scheduled = outcomes.iter().filter(|o| o.is_scheduled()).count();
            println!("{scheduled} of {} occurrence(s) scheduled", outcomes.len());
        }
        Command::Cancel { id, kind } => {
            if !reminders.cancel(&id, kind) {
                bail!("failed to cancel reminders for {kind} `{id}`");
            }
        }
        Command::CancelAll => {
            if !reminders.cancel_all() {
                bail!("failed to cancel reminders");
            }
        }
        Command::List { id, kind } => {
            for registration in reminders.list(id.as_deref(), kind) {
                println!("{}", describe(&registration));
            }
        }
        Command::Due => {
            for registration in reminders.take_due(Utc::now())? {
                println!("{}\n    {}", describe(&registration), registration.content.body);
            }
        }
    }
    Ok(())
}
