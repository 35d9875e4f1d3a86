//! Session domain entities and value objects.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sessions idle for longer than this are eligible for automatic removal.
pub const STALE_THRESHOLD_HOURS: i64 = 24;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a monitored CLI session.
///
/// Generated by the shell wrapper that launches the agent; we trust its
/// format and only require uniqueness within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle state of a monitored session.
///
/// `Idle` is deliberately two-faced: it counts as active for the session
/// list (the agent process is still alive) and as terminal for cleanup and
/// the recently-completed query (the agent has stopped doing work). Both
/// classifications are load-bearing; do not collapse them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Working,
    AwaitingApproval,
    Completed,
    Error,
    Idle,
}

impl SessionState {
    /// Parses the wire name (`WORKING`, `AWAITING_APPROVAL`, ...).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "WORKING" => Some(Self::Working),
            "AWAITING_APPROVAL" => Some(Self::AwaitingApproval),
            "COMPLETED" => Some(Self::Completed),
            "ERROR" => Some(Self::Error),
            "IDLE" => Some(Self::Idle),
            _ => None,
        }
    }

    /// Returns the wire name for this state.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Working => "WORKING",
            Self::AwaitingApproval => "AWAITING_APPROVAL",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Idle => "IDLE",
        }
    }

    /// Human-readable label for the presentation layer.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Working => "Working",
            Self::AwaitingApproval => "Waiting for approval",
            Self::Completed => "Completed",
            Self::Error => "Error",
            Self::Idle => "Idle",
        }
    }

    /// True when a human should look at this session.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::AwaitingApproval | Self::Completed | Self::Error)
    }

    /// True for states eligible for "clear completed" and recent-history
    /// queries. Note that `Idle` is terminal here while still counting as
    /// active in `is_active`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Idle)
    }

    /// True for states shown in the active session list.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Working | Self::AwaitingApproval | Self::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

// ============================================================================
// Session
// ============================================================================

/// One monitored CLI invocation.
///
/// Created from a `Start` lifecycle event, mutated in place by `StateChange`
/// and `End` events, and removed explicitly or by the staleness sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Tool identifier, e.g. "claude" or "codex".
    pub tool: String,
    /// Display name of the project the agent is working in.
    pub project_name: String,
    /// Process id of the wrapped CLI. Informational only; never signalled.
    pub pid: u32,
    pub state: SessionState,
    /// Last free-text status message.
    pub details: String,
    pub start_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    /// Creates a new session in the `Working` state.
    pub fn new(
        id: SessionId,
        tool: impl Into<String>,
        project_name: impl Into<String>,
        pid: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tool: tool.into(),
            project_name: project_name.into(),
            pid,
            state: SessionState::Working,
            details: String::new(),
            start_time: now,
            last_update_time: now,
        }
    }

    /// Applies a state transition, refreshing details and the update time.
    ///
    /// `last_update_time` is monotonically non-decreasing and never earlier
    /// than `start_time`.
    pub fn update_state(&mut self, new_state: SessionState, details: impl Into<String>) {
        self.state = new_state;
        self.details = details.into();
        let now = Utc::now();
        if now > self.last_update_time {
            self.last_update_time = now;
        }
    }

    /// Wall-clock time since the session started.
    pub fn duration(&self) -> Duration {
        Utc::now().signed_duration_since(self.start_time)
    }

    /// Compact duration string for the presentation layer ("4m", "32s").
    pub fn formatted_duration(&self) -> String {
        let secs = self.duration().num_seconds().max(0);
        let minutes = secs / 60;
        if minutes > 0 {
            format!("{minutes}m")
        } else {
            format!("{secs}s")
        }
    }

    /// Relative age of the last update ("just now", "1m ago", "5m ago").
    pub fn time_since_update(&self) -> String {
        let minutes = Utc::now()
            .signed_duration_since(self.last_update_time)
            .num_minutes()
            .max(0);
        match minutes {
            0 => "just now".to_string(),
            1 => "1m ago".to_string(),
            n => format!("{n}m ago"),
        }
    }

    /// True when the session has been idle past the staleness threshold at
    /// the given instant.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_update_time) > Duration::hours(STALE_THRESHOLD_HOURS)
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }
}

// ============================================================================
// Overall Summary
// ============================================================================

/// Aggregate state of the whole system, for the presentation layer's
/// top-level indicator. Evaluated in strict precedence order:
/// disconnected > paused > attention > working > idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    Disconnected,
    Paused,
    Idle,
    Working,
    Attention,
}
