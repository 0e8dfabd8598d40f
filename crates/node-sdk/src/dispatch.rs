//! Inbound message dispatch.
//!
//! Every message from the orchestrator is classified on the session loop and
//! handed to a tracked task, so a slow handler never stalls the loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use pg_protocol::{Envelope, InboundKind};
use serde_json::Value;

use crate::interface::Interface;

/// Application callbacks.  Every method defaults to a no-op.
#[async_trait::async_trait]
pub trait NodeServer: Send + Sync + 'static {
    /// The orchestrator acknowledged this node server.
    async fn start(&self, _iface: Interface) {}

    /// A new configuration arrived; `config` is already cached.
    async fn on_config(&self, _iface: Interface, _config: Value) {}

    async fn short_poll(&self, _iface: Interface) {}

    async fn long_poll(&self, _iface: Interface) {}
}

/// What [`Dispatcher::dispatch`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler task was started for this kind.
    Spawned(&'static str),
    /// Sent by someone other than the orchestrator.
    Foreign,
    Unhandled,
    Malformed,
}

pub struct Dispatcher {
    iface: Interface,
    server: Arc<dyn NodeServer>,
}

impl Dispatcher {
    pub fn new(iface: Interface, server: Arc<dyn NodeServer>) -> Self {
        Self { iface, server }
    }

    /// Classify `payload` and start its handler.  Must run inside a Tokio
    /// runtime.
    pub fn dispatch(&self, payload: &[u8]) -> Dispatch {
        let envelope = match Envelope::parse(payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "dropping unparseable message");
                return Dispatch::Malformed;
            }
        };

        if !envelope.is_from_orchestrator() {
            tracing::debug!(sender = %envelope.node, "ignoring message from another node");
            return Dispatch::Foreign;
        }

        let kind = match envelope.classify() {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed orchestrator message");
                return Dispatch::Malformed;
            }
        };

        let name = kind.name();
        tracing::debug!(kind = name, "dispatching");

        let iface = self.iface.clone();
        let server = self.server.clone();
        match kind {
            InboundKind::Connected => {
                self.spawn(name, async move { server.start(iface).await });
            }
            InboundKind::Config(config) => {
                self.iface.session().replace_config(config.clone());
                self.spawn(name, async move {
                    iface.params().set_custom_params_doc();
                    server.on_config(iface, config).await;
                });
            }
            InboundKind::ShortPoll => {
                self.spawn(name, async move { server.short_poll(iface).await });
            }
            InboundKind::LongPoll => {
                self.spawn(name, async move { server.long_poll(iface).await });
            }
            InboundKind::Command(req) => {
                self.spawn(name, async move {
                    let target = iface.clone();
                    target.nodes().run_command(iface, req).await;
                });
            }
            InboundKind::Query { address } => {
                self.spawn(name, async move { iface.nodes().query(&address) });
            }
            InboundKind::Status { address } => {
                self.spawn(name, async move { iface.nodes().status(&address) });
            }
            InboundKind::Unhandled => {
                tracing::info!("unhandled orchestrator message");
                return Dispatch::Unhandled;
            }
        }
        Dispatch::Spawned(name)
    }

    fn spawn<F>(&self, kind: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.iface.tracker().spawn(async move {
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                tracing::error!(kind, "handler panicked");
            }
        });
    }

    /// Wait up to `timeout` for every handler task to finish.  Returns
    /// whether they all did.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let tracker = self.iface.tracker();
        tracker.close();
        let done = tokio::time::timeout(timeout, tracker.wait()).await.is_ok();
        if !done {
            tracing::warn!(
                pending = tracker.len(),
                timeout_ms = timeout.as_millis() as u64,
                "handler tasks still running after drain timeout"
            );
        }
        tracker.reopen();
        done
    }
}
