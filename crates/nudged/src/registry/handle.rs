//! Client interface for interacting with the registry actor.

use tokio::sync::{broadcast, mpsc, oneshot};

use nudge_core::{OverallState, Session, SessionId};
use nudge_protocol::LifecycleEvent;

use crate::notify::SinkStatus;

use super::commands::{RegistryCommand, RegistryError, SessionEvent};

/// Cheap-to-clone handle for sending commands to the registry actor and
/// subscribing to session events.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Delivers one decoded lifecycle event to the registry.
    ///
    /// This is the funnel every socket connection feeds; ordering within a
    /// single connection is preserved by the channel.
    pub async fn apply(&self, event: LifecycleEvent) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Apply(event))
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Reports a listening-state transition of the socket server.
    pub async fn set_listening(&self, listening: bool) {
        // Fire-and-forget: if the actor is gone the daemon is shutting down.
        let _ = self
            .sender
            .send(RegistryCommand::SetListening(listening))
            .await;
    }

    /// All sessions, most-recent-first.
    pub async fn get_sessions(&self) -> Vec<Session> {
        self.query(|respond_to| RegistryCommand::GetSessions { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Sessions in an active state (Working, AwaitingApproval, Idle).
    pub async fn get_active_sessions(&self) -> Vec<Session> {
        self.query(|respond_to| RegistryCommand::GetActiveSessions { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Terminal-state sessions updated within the last hour.
    pub async fn get_recently_completed(&self) -> Vec<Session> {
        self.query(|respond_to| RegistryCommand::GetRecentlyCompleted { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Whether any session needs human attention.
    pub async fn has_attention_needed(&self) -> bool {
        self.query(|respond_to| RegistryCommand::HasAttentionNeeded { respond_to })
            .await
            .unwrap_or(false)
    }

    /// Aggregate system state; `Disconnected` when the actor is unreachable.
    pub async fn get_summary(&self) -> OverallState {
        self.query(|respond_to| RegistryCommand::GetSummary { respond_to })
            .await
            .unwrap_or(OverallState::Disconnected)
    }

    /// Whether the socket server is currently listening.
    pub async fn is_listening(&self) -> bool {
        self.query(|respond_to| RegistryCommand::GetListening { respond_to })
            .await
            .unwrap_or(false)
    }

    /// Push sink health and last-error state.
    pub async fn get_sink_status(&self) -> SinkStatus {
        self.query(|respond_to| RegistryCommand::GetSinkStatus { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Removes every terminal-state session; returns the count removed.
    pub async fn clear_completed(&self) -> usize {
        self.query(|respond_to| RegistryCommand::ClearCompleted { respond_to })
            .await
            .unwrap_or(0)
    }

    /// Removes a single session by id.
    pub async fn remove(&self, session_id: SessionId) -> Result<(), RegistryError> {
        self.query(|respond_to| RegistryCommand::Remove {
            session_id,
            respond_to,
        })
        .await?
    }

    /// Triggers a staleness sweep. Fire-and-forget.
    pub async fn sweep_stale(&self) {
        let _ = self.sender.send(RegistryCommand::SweepStale).await;
    }

    /// Sends the configuration-validation notification; returns success.
    pub async fn send_test(&self) -> bool {
        self.query(|respond_to| RegistryCommand::SendTest { respond_to })
            .await
            .unwrap_or(false)
    }

    /// Subscribes to session events published by the registry.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    /// Whether the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }
}
