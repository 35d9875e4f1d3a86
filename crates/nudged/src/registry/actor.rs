//! Registry actor - owns all session state and processes commands.
//!
//! The actor is the single owner of the session list. Socket connections
//! decode lines in parallel, but every decoded event arrives here through
//! one mpsc channel and is applied sequentially, so the session list and
//! the notification debounce ledger never see concurrent mutation.

use chrono::{Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use nudge_core::{ConfigHandle, OverallState, Session, SessionId, SessionState};
use nudge_protocol::LifecycleEvent;

use crate::notify::NotificationDispatcher;

use super::commands::{RegistryCommand, RegistryError, RemovalReason, SessionEvent};

/// Terminal sessions older than this fall out of the recently-completed view.
const RECENT_WINDOW_HOURS: i64 = 1;

/// The registry actor.
///
/// Sessions are kept most-recent-first; a start event inserts at the front.
/// The list stays small (one entry per live CLI session on this machine),
/// so linear scans are fine.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    sessions: Vec<Session>,
    /// Whether the socket server currently holds a listening socket.
    listening: bool,
    config: ConfigHandle,
    notifier: NotificationDispatcher,
    event_publisher: broadcast::Sender<SessionEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        config: ConfigHandle,
        notifier: NotificationDispatcher,
        event_publisher: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: Vec::new(),
            listening: false,
            config,
            notifier,
            event_publisher,
        }
    }

    /// Runs the actor event loop until all command senders are dropped.
    pub async fn run(mut self) {
        info!("Session registry starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Session registry stopped");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Apply(event) => self.handle_apply(event),
            RegistryCommand::SetListening(listening) => self.handle_set_listening(listening),
            RegistryCommand::GetSessions { respond_to } => {
                let _ = respond_to.send(self.sessions.clone());
            }
            RegistryCommand::GetActiveSessions { respond_to } => {
                let active = self
                    .sessions
                    .iter()
                    .filter(|s| s.state.is_active())
                    .cloned()
                    .collect();
                let _ = respond_to.send(active);
            }
            RegistryCommand::GetRecentlyCompleted { respond_to } => {
                let _ = respond_to.send(self.recently_completed());
            }
            RegistryCommand::HasAttentionNeeded { respond_to } => {
                let any = self.sessions.iter().any(|s| s.state.needs_attention());
                let _ = respond_to.send(any);
            }
            RegistryCommand::GetSummary { respond_to } => {
                let _ = respond_to.send(self.summary());
            }
            RegistryCommand::GetListening { respond_to } => {
                let _ = respond_to.send(self.listening);
            }
            RegistryCommand::GetSinkStatus { respond_to } => {
                let _ = respond_to.send(self.notifier.transport().status());
            }
            RegistryCommand::ClearCompleted { respond_to } => {
                let _ = respond_to.send(self.handle_clear_completed());
            }
            RegistryCommand::Remove {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_remove(session_id));
            }
            RegistryCommand::SweepStale => self.handle_sweep_stale(),
            RegistryCommand::SendTest { respond_to } => {
                // The send suspends on the network; run it off the actor loop.
                let transport = self.notifier.transport().clone();
                tokio::spawn(async move {
                    let _ = respond_to.send(transport.send_test().await);
                });
            }
        }
    }

    // ========================================================================
    // Lifecycle events
    // ========================================================================

    fn handle_apply(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Start {
                session_id,
                tool,
                project_name,
                pid,
            } => self.handle_start(session_id, tool, project_name, pid),

            LifecycleEvent::StateChange {
                session_id,
                state,
                details,
                working_duration_secs,
            } => self.handle_state_change(session_id, state, details, working_duration_secs),

            LifecycleEvent::End {
                session_id,
                exit_code,
            } => self.handle_end(session_id, exit_code),

            LifecycleEvent::Unknown { raw } => {
                debug!(raw = %raw, "Dropping undecodable event line");
            }
        }
    }

    /// A start for a disabled tool is dropped entirely; a start for a known
    /// id replaces the prior session. New sessions go to the front of the
    /// most-recent-first ordering.
    fn handle_start(&mut self, session_id: SessionId, tool: String, project_name: String, pid: u32) {
        if !self.config.is_tool_enabled(&tool) {
            debug!(session_id = %session_id, tool = %tool, "Tool disabled, dropping start event");
            return;
        }

        self.sessions.retain(|s| s.id != session_id);

        let session = Session::new(session_id.clone(), tool, project_name, pid);

        info!(
            session_id = %session_id,
            tool = %session.tool,
            project = %session.project_name,
            total_sessions = self.sessions.len() + 1,
            "Session started"
        );

        let _ = self.event_publisher.send(SessionEvent::Updated {
            session: Box::new(session.clone()),
        });

        self.sessions.insert(0, session);
    }

    /// State changes for unknown ids are dropped silently - the session may
    /// have been cleaned up already, or never created for a disabled tool.
    /// The notification path only runs when the state actually changed.
    fn handle_state_change(
        &mut self,
        session_id: SessionId,
        state: SessionState,
        details: String,
        working_duration_secs: Option<u64>,
    ) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            debug!(session_id = %session_id, "State change for unknown session, dropping");
            return;
        };

        let previous = session.state;
        session.update_state(state, details);

        debug!(
            session_id = %session_id,
            previous = %previous,
            state = %state,
            "Session state changed"
        );

        if state != previous {
            self.notifier
                .handle_transition(&*session, previous, working_duration_secs);
        }

        let snapshot = session.clone();
        let _ = self.event_publisher.send(SessionEvent::Updated {
            session: Box::new(snapshot),
        });
    }

    /// An end event overrides whatever state the session was in: exit 0 is
    /// `Completed`, anything else is `Error`. The notification path always
    /// runs - an end is a meaningful boundary even when the terminal state
    /// matches the previous one.
    fn handle_end(&mut self, session_id: SessionId, exit_code: i32) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            debug!(session_id = %session_id, "End event for unknown session, dropping");
            return;
        };

        let previous = session.state;
        let new_state = if exit_code == 0 {
            SessionState::Completed
        } else {
            SessionState::Error
        };
        session.update_state(new_state, format!("Exit code: {exit_code}"));

        info!(
            session_id = %session_id,
            exit_code = exit_code,
            state = %new_state,
            "Session ended"
        );

        self.notifier.handle_transition(&*session, previous, None);

        let snapshot = session.clone();
        let _ = self.event_publisher.send(SessionEvent::Updated {
            session: Box::new(snapshot),
        });
    }

    fn handle_set_listening(&mut self, listening: bool) {
        if self.listening == listening {
            return;
        }
        self.listening = listening;

        info!(listening = listening, "Socket server listening state changed");

        let _ = self
            .event_publisher
            .send(SessionEvent::ListeningChanged { listening });
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn recently_completed(&self) -> Vec<Session> {
        let cutoff = Utc::now() - Duration::hours(RECENT_WINDOW_HOURS);
        self.sessions
            .iter()
            .filter(|s| s.state.is_terminal() && s.last_update_time > cutoff)
            .cloned()
            .collect()
    }

    /// Strict precedence: disconnected > paused > attention > working > idle.
    fn summary(&self) -> OverallState {
        if !self.listening {
            return OverallState::Disconnected;
        }
        if self.config.is_paused() {
            return OverallState::Paused;
        }
        if self
            .sessions
            .iter()
            .any(|s| s.state == SessionState::AwaitingApproval)
        {
            return OverallState::Attention;
        }
        if self.sessions.iter().any(|s| s.state == SessionState::Working) {
            return OverallState::Working;
        }
        OverallState::Idle
    }

    // ========================================================================
    // Removal
    // ========================================================================

    fn handle_clear_completed(&mut self) -> usize {
        let (cleared, kept): (Vec<Session>, Vec<Session>) = std::mem::take(&mut self.sessions)
            .into_iter()
            .partition(|s| s.state.is_terminal());
        self.sessions = kept;

        for session in &cleared {
            let _ = self.event_publisher.send(SessionEvent::Removed {
                session_id: session.id.clone(),
                reason: RemovalReason::Cleared,
            });
        }

        if !cleared.is_empty() {
            info!(count = cleared.len(), "Cleared completed sessions");
        }

        cleared.len()
    }

    fn handle_remove(&mut self, session_id: SessionId) -> Result<(), RegistryError> {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != session_id);

        if self.sessions.len() == before {
            return Err(RegistryError::SessionNotFound(session_id));
        }

        info!(session_id = %session_id, reason = %RemovalReason::Explicit, "Session removed");

        let _ = self.event_publisher.send(SessionEvent::Removed {
            session_id,
            reason: RemovalReason::Explicit,
        });

        Ok(())
    }

    /// Removes sessions idle past the staleness threshold, regardless of
    /// state. This bounds growth from abandoned or orphaned emitters.
    fn handle_sweep_stale(&mut self) {
        let now = Utc::now();
        let (stale, kept): (Vec<Session>, Vec<Session>) = std::mem::take(&mut self.sessions)
            .into_iter()
            .partition(|s| s.is_stale_at(now));
        self.sessions = kept;

        for session in &stale {
            let idle_secs = now
                .signed_duration_since(session.last_update_time)
                .num_seconds();
            warn!(
                session_id = %session.id,
                idle_secs = idle_secs,
                reason = %RemovalReason::Stale,
                "Session removed by staleness sweep"
            );

            let _ = self.event_publisher.send(SessionEvent::Removed {
                session_id: session.id.clone(),
                reason: RemovalReason::Stale,
            });
        }
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
