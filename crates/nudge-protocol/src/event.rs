//! Typed lifecycle events and their structured wire form.

use nudge_core::{SessionId, SessionState};
use serde::{Deserialize, Serialize};

/// One lifecycle event from a shell-wrapped CLI session.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A wrapped CLI process started.
    Start {
        session_id: SessionId,
        tool: String,
        project_name: String,
        pid: u32,
    },

    /// The session moved to a new state.
    StateChange {
        session_id: SessionId,
        state: SessionState,
        details: String,
        /// Seconds spent working before this transition, when the emitter
        /// tracks it. Used to gate idle notifications after short bursts.
        working_duration_secs: Option<u64>,
    },

    /// The wrapped process exited.
    End { session_id: SessionId, exit_code: i32 },

    /// A line that could not be decoded. Carries the original text.
    Unknown { raw: String },
}

impl LifecycleEvent {
    pub fn start(
        session_id: impl Into<SessionId>,
        tool: impl Into<String>,
        project_name: impl Into<String>,
        pid: u32,
    ) -> Self {
        Self::Start {
            session_id: session_id.into(),
            tool: tool.into(),
            project_name: project_name.into(),
            pid,
        }
    }

    pub fn state_change(
        session_id: impl Into<SessionId>,
        state: SessionState,
        details: impl Into<String>,
    ) -> Self {
        Self::StateChange {
            session_id: session_id.into(),
            state,
            details: details.into(),
            working_duration_secs: None,
        }
    }

    pub fn end(session_id: impl Into<SessionId>, exit_code: i32) -> Self {
        Self::End {
            session_id: session_id.into(),
            exit_code,
        }
    }

    /// The session this event refers to, when it decoded.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Start { session_id, .. }
            | Self::StateChange { session_id, .. }
            | Self::End { session_id, .. } => Some(session_id),
            Self::Unknown { .. } => None,
        }
    }

    /// Serializes to one structured wire line (no trailing newline).
    ///
    /// `Unknown` events round-trip their raw text.
    pub fn to_wire_line(&self) -> String {
        let wire = match self {
            Self::Start {
                session_id,
                tool,
                project_name,
                pid,
            } => WireMessage {
                msg_type: "START".to_string(),
                session_id: Some(session_id.as_str().to_string()),
                tool: Some(tool.clone()),
                project_name: Some(project_name.clone()),
                pid: Some(*pid),
                ..WireMessage::default()
            },
            Self::StateChange {
                session_id,
                state,
                details,
                working_duration_secs,
            } => WireMessage {
                msg_type: "STATE".to_string(),
                session_id: Some(session_id.as_str().to_string()),
                state: Some(state.as_wire_str().to_string()),
                details: Some(details.clone()),
                working_duration_secs: *working_duration_secs,
                ..WireMessage::default()
            },
            Self::End {
                session_id,
                exit_code,
            } => WireMessage {
                msg_type: "END".to_string(),
                session_id: Some(session_id.as_str().to_string()),
                exit_code: Some(*exit_code),
                ..WireMessage::default()
            },
            Self::Unknown { raw } => return raw.clone(),
        };

        // A struct of strings and integers cannot fail to serialize.
        serde_json::to_string(&wire).unwrap_or_default()
    }
}

/// Flat structured wire form shared by the serializer and parser.
///
/// The `type` tag decides which payload fields are required; everything is
/// optional at the serde layer so a bad payload degrades to `Unknown`
/// instead of a decode error.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_duration_secs: Option<u64>,
}
