pub mod app;
pub mod config;

pub use crate::app::Reminders;
pub use crate::config::AppConfig;
