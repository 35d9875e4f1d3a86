//! Registry actor commands, errors, and published events.

use nudge_core::{OverallState, Session, SessionId};
use nudge_protocol::LifecycleEvent;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::notify::SinkStatus;

/// Commands sent to the registry actor.
///
/// Query commands carry a oneshot channel for the response; event and timer
/// commands are fire-and-forget.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Apply one decoded lifecycle event.
    ///
    /// All decoded events, regardless of which connection produced them,
    /// funnel through this command - it is the single serialization point
    /// in front of session and notification state.
    Apply(LifecycleEvent),

    /// The socket server's listening state changed.
    ///
    /// Sent once per transition, never per poll.
    SetListening(bool),

    /// All sessions, most-recent-first.
    GetSessions {
        respond_to: oneshot::Sender<Vec<Session>>,
    },

    /// Sessions in an active state (Working, AwaitingApproval, Idle).
    GetActiveSessions {
        respond_to: oneshot::Sender<Vec<Session>>,
    },

    /// Terminal-state sessions updated within the last hour.
    GetRecentlyCompleted {
        respond_to: oneshot::Sender<Vec<Session>>,
    },

    /// Whether any session needs human attention.
    HasAttentionNeeded { respond_to: oneshot::Sender<bool> },

    /// The aggregate system state for the top-level indicator.
    GetSummary {
        respond_to: oneshot::Sender<OverallState>,
    },

    /// Whether the socket server currently holds a listening socket.
    GetListening { respond_to: oneshot::Sender<bool> },

    /// Current push sink health and last-error state.
    GetSinkStatus {
        respond_to: oneshot::Sender<SinkStatus>,
    },

    /// Remove every terminal-state session. Responds with the count removed.
    ClearCompleted { respond_to: oneshot::Sender<usize> },

    /// Remove a single session by id.
    Remove {
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove sessions idle past the staleness threshold.
    ///
    /// Fire-and-forget, driven by the periodic sweep task.
    SweepStale,

    /// Send the configuration-validation notification, bypassing all
    /// suppression gates. Responds with whether the send succeeded.
    SendTest { respond_to: oneshot::Sender<bool> },
}

/// Errors from registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The actor shut down before responding.
    #[error("response channel closed")]
    ChannelClosed,
}

/// Events published by the registry to the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was created or changed state.
    Updated {
        /// Boxed to keep the enum small.
        session: Box<Session>,
    },

    /// A session left the registry.
    Removed {
        session_id: SessionId,
        reason: RemovalReason,
    },

    /// The local socket server started or stopped listening.
    ListeningChanged { listening: bool },
}

/// Why a session was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Explicitly removed through the presentation layer.
    Explicit,

    /// No updates past the staleness threshold.
    Stale,

    /// Swept up by a clear-completed request.
    Cleared,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicitly removed"),
            Self::Stale => write!(f, "no activity past staleness threshold"),
            Self::Cleared => write!(f, "cleared with completed sessions"),
        }
    }
}
