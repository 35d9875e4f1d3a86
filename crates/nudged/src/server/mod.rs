//! Unix socket server for the nudge daemon.
//!
//! The server owns the socket file for its lifetime: it recreates it on
//! start (deleting any stale leftover), restricts it to the owning user,
//! and removes it on shutdown. Connection reads run in parallel, one task
//! per client; decoded events are funneled into the registry actor's mpsc
//! channel, which is the single serialization point in front of session
//! state.
//!
//! A GUI-hosted long-lived server cannot rely on external supervision, so
//! the listen loop is self-healing: losing the socket (or failing to bind
//! it) logs the error and retries after a short flat backoff instead of
//! staying dead.

mod connection;

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::RegistryHandle;

/// Fallback socket path when no home directory can be resolved.
pub const FALLBACK_SOCKET_PATH: &str = "/tmp/nudge.sock";

/// Delay before re-attempting to listen after a failure.
///
/// Flat, not exponential: the service is locally scoped and the failure
/// modes (slow filesystem, racing cleanup) clear quickly or not at all.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Returns the default socket path under the per-user application directory.
pub fn default_socket_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".nudge").join("sock"),
        None => PathBuf::from(FALLBACK_SOCKET_PATH),
    }
}

/// How one round of the supervised listen loop ended.
enum ListenOutcome {
    Cancelled,
    Failed(io::Error),
}

/// Unix socket server accepting lifecycle events from shell wrappers.
pub struct SocketServer {
    socket_path: PathBuf,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl SocketServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            registry,
            cancel_token,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the supervised listen loop until cancelled.
    ///
    /// Listening-state transitions are reported to the registry exactly
    /// once per transition: true after a successful bind, false when the
    /// listener is lost or the server stops.
    pub async fn run(&self) {
        let mut listening = false;

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            match self.bind() {
                Ok(listener) => {
                    info!(socket = %self.socket_path.display(), "Daemon server listening");
                    self.report_listening(&mut listening, true).await;

                    match self.accept_loop(listener).await {
                        ListenOutcome::Cancelled => {
                            self.report_listening(&mut listening, false).await;
                            break;
                        }
                        ListenOutcome::Failed(e) => {
                            error!(error = %e, "Listener lost, restarting");
                            self.report_listening(&mut listening, false).await;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to start listening");
                    self.report_listening(&mut listening, false).await;
                }
            }

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = sleep(RESTART_DELAY) => {}
            }
        }

        self.report_listening(&mut listening, false).await;
        self.cleanup();
    }

    /// Prepares and binds the socket: parent directory created, stale
    /// socket file removed, permissions restricted to the owning user.
    fn bind(&self) -> Result<UnixListener, ServerError> {
        let setup_err = |e: io::Error| ServerError::Bind {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_err)?;
            }
        }

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_err)?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(setup_err)?;

        // The socket's filesystem permissions are the only caller
        // authentication in the system.
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
            .map_err(setup_err)?;

        Ok(listener)
    }

    /// Accepts connections until cancellation or a listener-level failure.
    async fn accept_loop(&self, listener: UnixListener) -> ListenOutcome {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    return ListenOutcome::Cancelled;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let registry = self.registry.clone();
                            let cancel = self.cancel_token.child_token();
                            tokio::spawn(connection::handle_client(stream, registry, cancel));
                        }
                        Err(e) => return ListenOutcome::Failed(e),
                    }
                }
            }
        }
    }

    /// Reports a listening transition, swallowing repeats.
    async fn report_listening(&self, current: &mut bool, listening: bool) {
        if *current == listening {
            return;
        }
        *current = listening;
        debug!(listening = listening, "Reporting listening transition");
        self.registry.set_listening(listening).await;
    }

    /// Removes the socket file on shutdown. Idempotent.
    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
        info!("Server cleanup complete");
    }
}

/// Errors from socket setup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind socket at {path}: {error}")]
    Bind { path: PathBuf, error: String },
}
