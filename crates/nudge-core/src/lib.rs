//! Core domain types for nudge.
//!
//! This crate holds the session model (one tracked CLI agent invocation and
//! its lifecycle state) and the configuration model consumed by the daemon:
//! notification categories, quiet hours, per-tool enablement, and the push
//! sink endpoint.

pub mod config;
pub mod session;

pub use config::{
    AppConfig, CategoryName, CategorySettings, ConfigError, ConfigHandle, NotificationPriority,
    NotificationSettings, QuietHours, SinkSettings,
};
pub use session::{OverallState, Session, SessionId, SessionState};
