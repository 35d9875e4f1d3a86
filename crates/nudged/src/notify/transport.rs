//! Best-effort HTTP transport to the push sink, with health tracking.
//!
//! Messages are POSTed to `{server}/{topic}` with title, priority, and tags
//! carried in headers and the message text as the body. Delivery is
//! fire-and-forget: a failed send records a retrievable error string and is
//! never retried - a later transition may succeed on its own. A periodic
//! probe re-evaluates reachability independently of actual sends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nudge_core::{ConfigHandle, NotificationPriority};
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timeout for notification POSTs.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reachability probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between reachability probes.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from a single send attempt.
///
/// These are recorded in [`SinkStatus::last_error`] and surfaced to the
/// presentation layer; they never propagate further.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("{0}")]
    Network(String),
}

/// One notification ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// Shown as the notification title (the project name).
    pub title: String,
    /// The message text.
    pub body: String,
    pub priority: NotificationPriority,
    /// Comma-separated icon hints for the sink.
    pub tags: String,
}

impl PushMessage {
    /// The configuration-validation message. Sent through the normal
    /// transport so a test exercises the real path.
    pub fn test() -> Self {
        Self {
            title: "nudge test".to_string(),
            body: "If you see this, notifications are working!".to_string(),
            priority: NotificationPriority::Default,
            tags: "tada".to_string(),
        }
    }
}

/// Observable sink state for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkStatus {
    /// Last send failure, cleared by the next successful send.
    pub last_error: Option<String>,
    pub last_successful_send: Option<DateTime<Utc>>,
    pub connection_healthy: bool,
}

/// Cheap-to-clone handle performing sends and health checks.
#[derive(Clone)]
pub struct PushTransport {
    client: reqwest::Client,
    config: ConfigHandle,
    status: Arc<Mutex<SinkStatus>>,
}

impl PushTransport {
    pub fn new(config: ConfigHandle) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            status: Arc::new(Mutex::new(SinkStatus::default())),
        }
    }

    /// Returns a point-in-time copy of the sink status.
    pub fn status(&self) -> SinkStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Posts one notification to the configured sink.
    ///
    /// Success updates `last_successful_send` and marks the connection
    /// healthy; failure records `last_error` and returns it. No retries.
    pub async fn send(&self, message: &PushMessage) -> Result<(), SendError> {
        let sink = self.config.snapshot().sink;
        let url = sink.publish_url();

        let response = self
            .client
            .post(&url)
            .header("Title", &message.title)
            .header("Priority", message.priority.wire_value().to_string())
            .header("Tags", &message.tags)
            .body(message.body.clone())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                debug!(url = %url, title = %message.title, "Notification sent");
                let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
                status.last_error = None;
                status.last_successful_send = Some(Utc::now());
                status.connection_healthy = true;
                Ok(())
            }
            Ok(resp) => {
                let err = SendError::Http {
                    status: resp.status().as_u16(),
                };
                self.record_failure(&err);
                Err(err)
            }
            Err(e) => {
                let err = SendError::Network(e.to_string());
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Sends the configuration-validation message, bypassing every
    /// suppression gate but using the same transport and health tracking.
    pub async fn send_test(&self) -> bool {
        self.send(&PushMessage::test()).await.is_ok()
    }

    /// Lightweight reachability probe against the sink's base URL.
    ///
    /// Only flips the health flag; a failed probe is not an error anywhere.
    pub async fn check_health(&self) {
        let server = self.config.snapshot().sink.server;

        let healthy = match self
            .client
            .head(&server)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(server = %server, error = %e, "Health check failed");
                false
            }
        };

        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .connection_healthy = healthy;
    }

    fn record_failure(&self, err: &SendError) {
        warn!(error = %err, "Notification send failed");
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_error = Some(err.to_string());
    }
}

/// Spawns the periodic health probe: one immediate check at startup, then
/// one per interval until cancelled.
pub fn spawn_health_probe(
    transport: PushTransport,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(HEALTH_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Health probe shutting down");
                    break;
                }
                // The first tick completes immediately, giving the startup check.
                _ = ticker.tick() => {
                    transport.check_health().await;
                }
            }
        }
    })
}
