//! nudged - session monitor and push notification daemon
//!
//! Accepts lifecycle events from shell-wrapped CLI agents over a local Unix
//! socket and relays attention-worthy transitions to a push sink.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! nudged start
//!
//! # Start the daemon (background/daemonized)
//! nudged start -d
//!
//! # Stop the daemon
//! nudged stop
//!
//! # Check daemon status
//! nudged status
//!
//! # Start with custom socket path
//! NUDGE_SOCKET=/run/nudge.sock nudged start
//!
//! # Enable debug logging
//! RUST_LOG=nudged=debug nudged start
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nudge_core::{AppConfig, ConfigHandle};
use nudged::notify::{spawn_health_probe, NotificationDispatcher, PushTransport};
use nudged::registry::spawn_registry;
use nudged::server::{default_socket_path, SocketServer};

/// nudge daemon - CLI agent session monitor
#[derive(Parser, Debug)]
#[command(name = "nudged", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("nudge");
    state_dir.join("nudged.pid")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("nudge");
    state_dir.join("nudged.log")
}

/// Returns the path to the configuration file.
fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("NUDGE_CONFIG") {
        return PathBuf::from(path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".nudge").join("config.toml"),
        None => PathBuf::from("/tmp/nudge-config.toml"),
    }
}

/// Returns the socket path, honoring the NUDGE_SOCKET override.
fn socket_path() -> PathBuf {
    match env::var("NUDGE_SOCKET") {
        Ok(path) => PathBuf::from(path),
        Err(_) => default_socket_path(),
    }
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let path = pid_file_path();
    let _ = fs::remove_file(path);
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Checks if the daemon is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {}", pid);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'nudged stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Daemonize before starting the tokio runtime
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon();

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {})...", pid);
                stop_daemon(pid)?;

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {})", pid);

                let socket = socket_path();
                if socket.exists() {
                    println!("Socket: {}", socket.display());
                }

                let config = AppConfig::load_or_default(&config_file_path());
                println!("Sink: {}", config.sink.subscribe_url());

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("nudged=info".parse()?)
                .add_directive("nudge_core=info".parse()?)
                .add_directive("nudge_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "nudge daemon starting"
    );

    let config_path = config_file_path();
    let config = AppConfig::load_or_default(&config_path);

    // First run: persist the generated sink topic so the phone subscription
    // survives restarts.
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!(path = %config_path.display(), error = %e, "Failed to write initial config");
        }
    }

    info!(sink = %config.sink.subscribe_url(), "Push sink configured");

    let config = ConfigHandle::new(config);

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Transport and its independent health probe
    let transport = PushTransport::new(config.clone());
    let _health_probe = spawn_health_probe(transport.clone(), cancel_token.clone());

    // Registry actor with the notification dispatcher on its serialized path
    let notifier = NotificationDispatcher::new(config.clone(), transport);
    let registry = spawn_registry(config, notifier);
    info!("Session registry started");

    // Supervised socket server; runs until cancelled
    let server = SocketServer::new(socket_path(), registry, cancel_token);
    server.run().await;

    info!("nudge daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigterm), Ok(mut sigint)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        warn!("Failed to install signal handlers");
        std::future::pending::<()>().await;
        return;
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }
}
