//! Per-connection line framing and event delivery.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::RegistryHandle;

/// Maximum accepted line length (1 MB).
const MAX_LINE_BYTES: usize = 1_048_576;

/// Reads newline-delimited event lines from one client until EOF, error, or
/// cancellation.
///
/// `read_line` keeps partial trailing data buffered across reads, so a line
/// split over several writes still arrives whole. Each complete line goes
/// through the codec and, when it decodes, into the registry's command
/// channel; events already delivered are never rolled back, whatever happens
/// to the connection afterwards.
pub(crate) async fn handle_client(
    stream: UnixStream,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        line.clear();

        tokio::select! {
            _ = cancel_token.cancelled() => {
                // In-flight partial lines are discarded, not flushed.
                debug!("Connection cancelled by shutdown");
                break;
            }

            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        debug!("Client closed connection");
                        break;
                    }
                    Ok(_) => {
                        if line.len() > MAX_LINE_BYTES {
                            warn!(bytes = line.len(), "Oversized line, dropping connection");
                            break;
                        }
                        let Some(event) = nudge_protocol::parse(&line) else {
                            continue;
                        };
                        if registry.apply(event).await.is_err() {
                            // Registry gone; the daemon is shutting down.
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Connection read error");
                        break;
                    }
                }
            }
        }
    }
}
