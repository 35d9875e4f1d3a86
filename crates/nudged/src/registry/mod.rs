//! Session registry using the actor pattern.
//!
//! The registry is the single owner of session state. Socket connections
//! decode events concurrently, but every event is funneled through one mpsc
//! channel into the actor, which applies it sequentially and runs the
//! notification decision on the same path. Subscribers (the presentation
//! layer) receive state changes over a broadcast channel.

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::debug;

use nudge_core::ConfigHandle;

use crate::notify::NotificationDispatcher;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RemovalReason, SessionEvent};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Interval between staleness sweeps.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Spawns the registry actor and its periodic staleness sweep, returning a
/// handle for interaction.
pub fn spawn_registry(config: ConfigHandle, notifier: NotificationDispatcher) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, config, notifier, event_tx.clone());
    tokio::spawn(actor.run());

    let handle = RegistryHandle::new(cmd_tx.clone(), event_tx);

    spawn_sweep_task(cmd_tx);

    handle
}

/// Spawns the background task that triggers periodic staleness sweeps.
fn spawn_sweep_task(sender: mpsc::Sender<RegistryCommand>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));

        loop {
            ticker.tick().await;

            if sender.send(RegistryCommand::SweepStale).await.is_err() {
                debug!("Sweep task stopping: registry channel closed");
                break;
            }
        }
    });
}
