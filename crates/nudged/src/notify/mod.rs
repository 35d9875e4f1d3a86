//! Notification policy: decides which state transitions reach the user.
//!
//! The decision pipeline per transition: global pause, category mapping,
//! category enablement, then the suppression gates in order - per-session
//! debounce, quiet hours, host DND. A send that passes every gate records
//! its debounce timestamp before the network call starts, so rapid duplicate
//! transitions cannot double-send.

mod dnd;
mod transport;

pub use dnd::{FocusProbe, SystemFocusProbe};
pub use transport::{
    spawn_health_probe, PushMessage, PushTransport, SendError, SinkStatus,
};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nudge_core::{CategoryName, ConfigHandle, Session, SessionId, SessionState};
use tracing::debug;

/// Suppression window for repeat notifications about the same session.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

/// Minimum seconds of prior work for an idle transition to notify.
///
/// Idle is a soft completion signal; a burst shorter than this is noise.
pub const MIN_WORKING_SECS_FOR_IDLE: u64 = 30;

/// The three notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Approval,
    Completed,
    Error,
}

impl Category {
    pub fn name(&self) -> CategoryName {
        match self {
            Self::Approval => CategoryName::Approval,
            Self::Completed => CategoryName::Completed,
            Self::Error => CategoryName::Error,
        }
    }

    /// Icon hint forwarded to the sink.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Approval => "warning",
            Self::Completed => "white_check_mark",
            Self::Error => "x",
        }
    }

    /// Message body, templated on the tool name.
    pub fn body(&self, tool: &str) -> String {
        let tool = capitalize(tool);
        match self {
            Self::Approval => format!("{tool} is waiting for approval"),
            Self::Completed => format!("{tool} finished"),
            Self::Error => format!("{tool} encountered an error"),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Maps a state transition to the notification category it warrants, if any.
///
/// - `AwaitingApproval` always maps to the approval category.
/// - `Completed` maps to completed unless the user was just asked for
///   approval (they already know about this session).
/// - `Error` always maps to the error category.
/// - `Idle` is a soft completion: only after genuine work (previous state
///   `Working`, and either no duration reported or at least
///   [`MIN_WORKING_SECS_FOR_IDLE`] seconds of it).
/// - `Working` never notifies.
pub fn category_for_transition(
    previous: SessionState,
    new: SessionState,
    working_duration_secs: Option<u64>,
) -> Option<Category> {
    match new {
        SessionState::AwaitingApproval => Some(Category::Approval),

        SessionState::Completed => {
            if previous == SessionState::AwaitingApproval {
                None
            } else {
                Some(Category::Completed)
            }
        }

        SessionState::Error => Some(Category::Error),

        SessionState::Idle => {
            if previous != SessionState::Working {
                return None;
            }
            let worked_long_enough = working_duration_secs
                .map(|secs| secs >= MIN_WORKING_SECS_FOR_IDLE)
                .unwrap_or(true);
            worked_long_enough.then_some(Category::Completed)
        }

        SessionState::Working => None,
    }
}

/// Decides and performs notification sends for session transitions.
///
/// Owned by the registry actor, so every decision runs on the same
/// serialized path that mutates session state. The actual HTTP send is
/// spawned so the actor loop never blocks on the network.
pub struct NotificationDispatcher {
    config: ConfigHandle,
    transport: PushTransport,
    focus: Box<dyn FocusProbe>,
    /// Per-session last-notification timestamps, process-lifetime only.
    debounce: HashMap<SessionId, Instant>,
}

impl NotificationDispatcher {
    pub fn new(config: ConfigHandle, transport: PushTransport) -> Self {
        Self::with_focus_probe(config, transport, Box::new(SystemFocusProbe))
    }

    pub fn with_focus_probe(
        config: ConfigHandle,
        transport: PushTransport,
        focus: Box<dyn FocusProbe>,
    ) -> Self {
        Self {
            config,
            transport,
            focus,
            debounce: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &PushTransport {
        &self.transport
    }

    /// Runs the decision pipeline for one transition and fires the send
    /// when it passes. Must be called from the registry's serialized path.
    pub fn handle_transition(
        &mut self,
        session: &Session,
        previous: SessionState,
        working_duration_secs: Option<u64>,
    ) {
        if let Some(message) = self.evaluate(session, previous, working_duration_secs, Instant::now())
        {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                // Failures are recorded in the sink status; nothing to do here.
                let _ = transport.send(&message).await;
            });
        }
    }

    /// The full gate pipeline. Returns the message to send, having already
    /// recorded the debounce timestamp, or `None` when suppressed.
    fn evaluate(
        &mut self,
        session: &Session,
        previous: SessionState,
        working_duration_secs: Option<u64>,
        now: Instant,
    ) -> Option<PushMessage> {
        let config = self.config.snapshot();

        if config.paused {
            debug!(session_id = %session.id, "Notifications paused, skipping");
            return None;
        }

        let category = category_for_transition(previous, session.state, working_duration_secs)?;
        let settings = config.category(category.name());
        if !settings.enabled {
            return None;
        }

        if let Some(last_sent) = self.debounce.get(&session.id) {
            if now.duration_since(*last_sent) < DEBOUNCE_WINDOW {
                debug!(session_id = %session.id, "Debouncing notification");
                return None;
            }
        }

        if config.quiet_hours.is_active_now() {
            debug!(session_id = %session.id, "Quiet hours active, skipping notification");
            return None;
        }

        if config.respect_dnd && self.focus.focus_active() {
            debug!(session_id = %session.id, "Do Not Disturb active, skipping notification");
            return None;
        }

        // Recorded before the send so a duplicate transition racing the
        // network call is already suppressed.
        self.debounce.insert(session.id.clone(), now);

        Some(PushMessage {
            title: session.project_name.clone(),
            body: category.body(&session.tool),
            priority: settings.priority,
            tags: category.tag().to_string(),
        })
    }

    /// Forgets the debounce timestamp for one session.
    pub fn clear_debounce(&mut self, session_id: &SessionId) {
        self.debounce.remove(session_id);
    }

    /// Empties the debounce ledger.
    pub fn clear_all_debounce(&mut self) {
        self.debounce.clear();
    }
}
