//! `pg-node-sdk` — runtime for Polyglot node servers.
//!
//! A node server is a process the Polyglot orchestrator launches to expose
//! devices ("nodes").  It reads one JSON startup line from stdin, connects to
//! the orchestrator's MQTT broker, and from then on exchanges JSON envelopes:
//! it announces nodes and driver values, and receives configuration, polls
//! and commands.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Your node server                                          │
//! │                                                            │
//! │   impl NodeServer for MyServer {                           │
//! │       async fn start(&self, iface: Interface) {            │
//! │           let ctl = iface.alloc_node("ctl", "ctl",         │
//! │                                      "ctl", "Controller"); │
//! │           ctl.add_driver("ST", "1", 2);                    │
//! │           iface.add_node(&ctl);                            │
//! │       }                                                    │
//! │   }                                                        │
//! │                                                            │
//! │   PolyglotClientBuilder::from_stdin()?                     │
//! │       .build()?                                            │
//! │       .run(MyServer, shutdown)                             │
//! │       .await;                                              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Session flow
//!
//! 1. Connect to the broker (TLS when certificates are present)
//! 2. Subscribe to the broadcast topic and `udi/polyglot/ns/<profile>`
//! 3. Publish `{"connected": true}` on `udi/polyglot/connections/<profile>`
//! 4. Main loop: every orchestrator message runs on its own tracked task
//!    - `connected` → [`NodeServer::start`]
//!    - `config` → cache, publish parameter docs once, [`NodeServer::on_config`]
//!    - `shortPoll` / `longPoll` → poll callbacks
//!    - `command` → the addressed node's [`CommandHandler`]
//!    - `query` / `status` → driver reports
//! 5. On shutdown: stop reading, wait for running handlers, return

pub mod builder;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod interface;
pub mod logging;
pub mod node;
pub mod notices;
pub mod params;
pub mod publisher;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::PolyglotClientBuilder;
pub use client::{PolyglotClient, SessionManager};
pub use config::{Settings, StartupInfo, TlsSettings};
pub use dispatch::NodeServer;
pub use interface::Interface;
pub use node::{CommandHandler, DefaultNodeOps, Driver, NodeHandle, NodeOps};
pub use reconnect::ReconnectBackoff;
pub use session::ConnectionState;
pub use types::{CommandContext, InterfaceError, TransportError};

// Re-export protocol types so node servers never need to import pg-protocol directly.
pub use pg_protocol::{Namespace, Pair, ALL_NODES};
pub use tokio_util::sync::CancellationToken;
