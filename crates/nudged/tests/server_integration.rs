//! Integration tests for the Unix socket server.
//!
//! These drive the server end-to-end: raw bytes over a Unix stream, through
//! the codec, into the registry actor, observed via the query interface.

use std::path::PathBuf;
use std::time::Duration;

use nudge_core::{AppConfig, ConfigHandle, OverallState, Session, SessionState};
use nudged::notify::{NotificationDispatcher, PushTransport};
use nudged::registry::{spawn_registry, RegistryHandle};
use nudged::server::SocketServer;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum time to wait for an event to reach the registry
const EVENT_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    registry: RegistryHandle,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    /// Spawns a server whose notification categories are disabled and whose
    /// sink points at a closed port, so no test touches the network.
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");

        let mut config = AppConfig::default();
        config.notifications.approval.enabled = false;
        config.notifications.completed.enabled = false;
        config.notifications.error.enabled = false;
        config.sink.server = "http://127.0.0.1:1".to_string();

        let handle = ConfigHandle::new(config);
        let transport = PushTransport::new(handle.clone());
        let notifier = NotificationDispatcher::new(handle.clone(), transport);
        let registry = spawn_registry(handle, notifier);

        let cancel_token = CancellationToken::new();
        let server = SocketServer::new(socket_path.clone(), registry.clone(), cancel_token.clone());

        tokio::spawn(async move {
            server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            cancel_token,
            registry,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a client connection to the server.
    async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server")
    }

    /// Sends one event line (newline appended) over a fresh connection.
    async fn send_line(&self, line: &str) {
        let mut stream = self.connect().await;
        stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write line");
        stream.flush().await.expect("flush");
    }

    /// Polls the registry until the predicate holds or times out.
    async fn wait_for_sessions(&self, predicate: impl Fn(&[Session]) -> bool) -> Vec<Session> {
        let start = tokio::time::Instant::now();
        loop {
            let sessions = self.registry.get_sessions().await;
            if predicate(&sessions) {
                return sessions;
            }
            assert!(
                start.elapsed() < EVENT_WAIT_TIMEOUT,
                "Timed out waiting for registry state; last seen: {sessions:?}"
            );
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Shuts down the server gracefully.
    async fn shutdown(self) -> PathBuf {
        self.cancel_token.cancel();
        sleep(Duration::from_millis(100)).await;
        self.socket_path
    }
}

#[tokio::test]
async fn test_structured_start_and_state_reach_registry() {
    let server = TestServer::spawn().await;

    let mut stream = server.connect().await;
    stream
        .write_all(
            b"{\"type\":\"START\",\"session_id\":\"s1\",\"tool\":\"claude\",\"project_name\":\"demo\",\"pid\":100}\n",
        )
        .await
        .unwrap();
    stream
        .write_all(
            b"{\"type\":\"STATE\",\"session_id\":\"s1\",\"state\":\"AWAITING_APPROVAL\",\"details\":\"confirm?\"}\n",
        )
        .await
        .unwrap();
    stream.flush().await.unwrap();

    let sessions = server
        .wait_for_sessions(|s| {
            s.len() == 1 && s[0].state == SessionState::AwaitingApproval
        })
        .await;

    assert_eq!(sessions[0].id.as_str(), "s1");
    assert_eq!(sessions[0].tool, "claude");
    assert_eq!(sessions[0].project_name, "demo");
    assert_eq!(sessions[0].pid, 100);
    assert_eq!(sessions[0].details, "confirm?");

    assert!(server.registry.has_attention_needed().await);
    assert_eq!(server.registry.get_summary().await, OverallState::Attention);

    server.shutdown().await;
}

#[tokio::test]
async fn test_end_for_unknown_session_is_dropped() {
    let server = TestServer::spawn().await;

    server.send_line("END|s1|1").await;

    // Give the event time to travel the full path, then confirm nothing
    // was created.
    sleep(Duration::from_millis(100)).await;
    assert!(server.registry.get_sessions().await.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_legacy_lines_are_accepted() {
    let server = TestServer::spawn().await;

    let mut stream = server.connect().await;
    stream
        .write_all(b"START|s1|codex|api-server|4242\nSTATE|s1|WORKING|building\nEND|s1|0\n")
        .await
        .unwrap();
    stream.flush().await.unwrap();

    let sessions = server
        .wait_for_sessions(|s| s.len() == 1 && s[0].state == SessionState::Completed)
        .await;

    assert_eq!(sessions[0].tool, "codex");
    assert_eq!(sessions[0].details, "Exit code: 0");

    server.shutdown().await;
}

#[tokio::test]
async fn test_partial_writes_are_reassembled() {
    let server = TestServer::spawn().await;

    let mut stream = server.connect().await;
    // One line, split mid-field across three writes.
    stream.write_all(b"START|s1|cla").await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    stream.write_all(b"ude|demo|1").await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    stream.write_all(b"00\n").await.unwrap();
    stream.flush().await.unwrap();

    let sessions = server.wait_for_sessions(|s| s.len() == 1).await;
    assert_eq!(sessions[0].id.as_str(), "s1");
    assert_eq!(sessions[0].tool, "claude");
    assert_eq!(sessions[0].pid, 100);

    server.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_line_does_not_poison_connection() {
    let server = TestServer::spawn().await;

    let mut stream = server.connect().await;
    stream
        .write_all(b"complete nonsense\nSTART|s1|claude|demo|100\n")
        .await
        .unwrap();
    stream.flush().await.unwrap();

    // The garbage line is dropped; the next line on the same connection
    // still goes through.
    let sessions = server.wait_for_sessions(|s| s.len() == 1).await;
    assert_eq!(sessions[0].id.as_str(), "s1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_connections() {
    let server = TestServer::spawn().await;

    let mut clients = Vec::new();
    for i in 0..5 {
        let mut stream = server.connect().await;
        stream
            .write_all(format!("START|s{i}|claude|project-{i}|{}\n", 100 + i).as_bytes())
            .await
            .unwrap();
        stream.flush().await.unwrap();
        clients.push(stream);
    }

    server.wait_for_sessions(|s| s.len() == 5).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_listening_flag_follows_server_lifecycle() {
    let server = TestServer::spawn().await;

    // Bound socket: not disconnected.
    let registry = server.registry.clone();
    let start = tokio::time::Instant::now();
    while !registry.is_listening().await {
        assert!(start.elapsed() < EVENT_WAIT_TIMEOUT, "never started listening");
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registry.get_summary().await, OverallState::Idle);

    let socket_path = server.shutdown().await;

    // Stopped: socket removed, summary reports disconnected.
    assert!(!socket_path.exists(), "socket file should be removed on stop");
    assert!(!registry.is_listening().await);
    assert_eq!(registry.get_summary().await, OverallState::Disconnected);
}

#[tokio::test]
async fn test_events_from_one_connection_stay_ordered() {
    let server = TestServer::spawn().await;

    let mut stream = server.connect().await;
    let mut payload = String::from("START|s1|claude|demo|100\n");
    for i in 0..20 {
        let state = if i % 2 == 0 { "WORKING" } else { "IDLE" };
        payload.push_str(&format!("STATE|s1|{state}|step {i}\n"));
    }
    payload.push_str("END|s1|0\n");
    stream.write_all(payload.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    // The END must be applied last: final state is Completed, details from
    // the end event.
    let sessions = server
        .wait_for_sessions(|s| s.len() == 1 && s[0].state == SessionState::Completed)
        .await;
    assert_eq!(sessions[0].details, "Exit code: 0");

    server.shutdown().await;
}
