//! nudged - the nudge daemon.
//!
//! Accepts lifecycle events from shell-wrapped CLI agent sessions over a
//! local Unix socket, maintains the session registry, and pushes remote
//! notifications when a session needs human attention.
//!
//! # Architecture
//!
//! ```text
//! shell wrapper ──line──▶ SocketServer ──parse──▶ RegistryHandle (mpsc)
//!                                                        │
//!                                                 RegistryActor
//!                                                 (session state)
//!                                                        │
//!                                            NotificationDispatcher
//!                                             (policy + debounce)
//!                                                        │
//!                                                  PushTransport ──▶ sink
//! ```
//!
//! Socket I/O is parallel (one task per connection); session and
//! notification state are only ever touched from the registry actor's
//! single task.

pub mod notify;
pub mod registry;
pub mod server;
