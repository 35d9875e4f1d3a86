//! Daemon configuration: notification preferences, quiet hours, per-tool
//! enablement, and the push sink endpoint.
//!
//! The on-disk format is TOML with every field defaulted, so a partial (or
//! absent) file always yields a usable configuration. Runtime flag changes
//! (pausing notifications) go through [`ConfigHandle`] and are not written
//! back here; persistence is the settings surface's job.

use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::warn;

/// Default push sink server.
pub const DEFAULT_SINK_SERVER: &str = "https://ntfy.sh";

/// Errors from loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ============================================================================
// Notification preferences
// ============================================================================

/// Priority forwarded to the push sink, mapped to its 1-5 integer scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Min,
    Low,
    Default,
    High,
    Urgent,
}

impl NotificationPriority {
    /// Integer severity understood by the sink (Min=1 .. Urgent=5).
    pub fn wire_value(&self) -> u8 {
        match self {
            Self::Min => 1,
            Self::Low => 2,
            Self::Default => 3,
            Self::High => 4,
            Self::Urgent => 5,
        }
    }
}

/// Per-category notification settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    pub enabled: bool,
    pub priority: NotificationPriority,
}

impl CategorySettings {
    pub const fn new(enabled: bool, priority: NotificationPriority) -> Self {
        Self { enabled, priority }
    }
}

/// Settings for the three notification categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub approval: CategorySettings,
    pub completed: CategorySettings,
    pub error: CategorySettings,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            approval: CategorySettings::new(true, NotificationPriority::Urgent),
            completed: CategorySettings::new(true, NotificationPriority::Default),
            error: CategorySettings::new(true, NotificationPriority::High),
        }
    }
}

// ============================================================================
// Quiet hours
// ============================================================================

/// A daily time window during which notifications are suppressed.
///
/// `start > end` wraps past midnight: active from `start` through midnight
/// into `end` the next day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    pub enabled: bool,
    /// "HH:mm"
    pub start: String,
    /// "HH:mm"
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }
}

impl QuietHours {
    /// Whether the window is active at the given time of day.
    ///
    /// Unparseable start/end strings deactivate the window rather than
    /// erroring; a broken config must not silence or unsilence anything
    /// unpredictably.
    pub fn is_active_at(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }

        let (start, end) = match (parse_hhmm(&self.start), parse_hhmm(&self.end)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                warn!(start = %self.start, end = %self.end, "Invalid quiet hours window");
                return false;
            }
        };

        if start < end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }

    /// Whether the window is active right now, in local time.
    pub fn is_active_now(&self) -> bool {
        self.is_active_at(Local::now().time())
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

// ============================================================================
// Push sink
// ============================================================================

/// The remote push sink endpoint: messages are POSTed to `{server}/{topic}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub server: String,
    pub topic: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SINK_SERVER.to_string(),
            topic: generate_topic(),
        }
    }
}

impl SinkSettings {
    /// URL a phone client subscribes to.
    pub fn subscribe_url(&self) -> String {
        format!("{}/{}", self.server, self.topic)
    }

    /// URL notifications are POSTed to (same as the subscribe URL).
    pub fn publish_url(&self) -> String {
        self.subscribe_url()
    }
}

/// Generates a fresh, hard-to-guess topic name.
///
/// The topic is the only secret protecting the notification stream, so it
/// must carry enough entropy to not be enumerable.
pub fn generate_topic() -> String {
    format!("nudge-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// The full daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Master switch: suppresses every notification while set.
    pub paused: bool,
    /// Suppress notifications while the host's focus/do-not-disturb mode is on.
    pub respect_dnd: bool,
    pub notifications: NotificationSettings,
    /// Per-tool enablement. Tools absent from the map are enabled.
    pub tools: BTreeMap<String, bool>,
    pub quiet_hours: QuietHours,
    pub sink: SinkSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut tools = BTreeMap::new();
        tools.insert("claude".to_string(), true);
        tools.insert("codex".to_string(), true);
        Self {
            paused: false,
            respect_dnd: true,
            notifications: NotificationSettings::default(),
            tools,
            quiet_hours: QuietHours::default(),
            sink: SinkSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads the configuration, falling back to defaults when the file is
    /// missing or unreadable. A malformed file is logged, not fatal: the
    /// daemon must come up regardless.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Writes the configuration as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Whether sessions for this tool should be tracked at all.
    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        self.tools.get(tool).copied().unwrap_or(true)
    }

    pub fn category(&self, name: CategoryName) -> CategorySettings {
        match name {
            CategoryName::Approval => self.notifications.approval,
            CategoryName::Completed => self.notifications.completed,
            CategoryName::Error => self.notifications.error,
        }
    }
}

/// Names of the three notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryName {
    Approval,
    Completed,
    Error,
}

// ============================================================================
// Shared handle
// ============================================================================

/// Cheap-to-clone shared configuration handle.
///
/// The registry actor and notification dispatcher both read it; the settings
/// surface writes it. Lock poisoning is recovered rather than propagated so
/// a panicked writer can never take notifications down with it.
#[derive(Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns a point-in-time copy of the configuration.
    pub fn snapshot(&self) -> AppConfig {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Applies a mutation to the live configuration.
    pub fn update(&self, f: impl FnOnce(&mut AppConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    pub fn set_paused(&self, paused: bool) {
        self.update(|c| c.paused = paused);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).paused
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_tool_enabled(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_priority_wire_values() {
        assert_eq!(NotificationPriority::Min.wire_value(), 1);
        assert_eq!(NotificationPriority::Low.wire_value(), 2);
        assert_eq!(NotificationPriority::Default.wire_value(), 3);
        assert_eq!(NotificationPriority::High.wire_value(), 4);
        assert_eq!(NotificationPriority::Urgent.wire_value(), 5);
    }

    #[test]
    fn test_quiet_hours_overnight_window() {
        let window = QuietHours {
            enabled: true,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        };
        assert!(window.is_active_at(time(23, 30)));
        assert!(window.is_active_at(time(3, 0)));
        assert!(!window.is_active_at(time(12, 0)));
    }

    #[test]
    fn test_quiet_hours_same_day_window() {
        let window = QuietHours {
            enabled: true,
            start: "09:00".to_string(),
            end: "17:00".to_string(),
        };
        assert!(window.is_active_at(time(12, 0)));
        assert!(!window.is_active_at(time(20, 0)));
        // Start is inclusive, end is exclusive.
        assert!(window.is_active_at(time(9, 0)));
        assert!(!window.is_active_at(time(17, 0)));
    }

    #[test]
    fn test_quiet_hours_disabled_or_invalid() {
        let disabled = QuietHours {
            enabled: false,
            start: "00:00".to_string(),
            end: "23:59".to_string(),
        };
        assert!(!disabled.is_active_at(time(12, 0)));

        let invalid = QuietHours {
            enabled: true,
            start: "not-a-time".to_string(),
            end: "08:00".to_string(),
        };
        assert!(!invalid.is_active_at(time(12, 0)));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.paused);
        assert!(config.respect_dnd);
        assert!(config.notifications.approval.enabled);
        assert_eq!(
            config.notifications.approval.priority,
            NotificationPriority::Urgent
        );
        assert!(config.is_tool_enabled("claude"));
        assert!(config.is_tool_enabled("codex"));
        // Unknown tools are tracked by default.
        assert!(config.is_tool_enabled("aider"));
        assert!(config.sink.topic.starts_with("nudge-"));
        assert_eq!(config.sink.server, DEFAULT_SINK_SERVER);
    }

    #[test]
    fn test_disabled_tool() {
        let mut config = AppConfig::default();
        config.tools.insert("codex".to_string(), false);
        assert!(!config.is_tool_enabled("codex"));
        assert!(config.is_tool_enabled("claude"));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.paused = true;
        config.quiet_hours.enabled = true;
        config.sink.topic = "nudge-test-topic".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "paused = true\n").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert!(loaded.paused);
        // Everything else defaulted.
        assert!(loaded.notifications.completed.enabled);
        assert!(loaded.respect_dnd);
    }

    #[test]
    fn test_load_or_default_on_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.toml");
        let config = AppConfig::load_or_default(&missing);
        assert!(!config.paused);

        let malformed = dir.path().join("bad.toml");
        std::fs::write(&malformed, "paused = {{{{").unwrap();
        let config = AppConfig::load_or_default(&malformed);
        assert!(!config.paused);
    }

    #[test]
    fn test_generated_topics_are_unique() {
        assert_ne!(generate_topic(), generate_topic());
    }

    #[test]
    fn test_subscribe_url() {
        let sink = SinkSettings {
            server: "https://ntfy.sh".to_string(),
            topic: "nudge-abc".to_string(),
        };
        assert_eq!(sink.subscribe_url(), "https://ntfy.sh/nudge-abc");
    }

    #[test]
    fn test_config_handle_shared_mutation() {
        let handle = ConfigHandle::new(AppConfig::default());
        let other = handle.clone();
        other.set_paused(true);
        assert!(handle.is_paused());
        assert!(handle.snapshot().paused);
    }
}
