//! In-process transport for tests and local tooling.
//!
//! [`MemoryTransport`] records everything published; [`MemoryBroker`] pushes
//! connection events and inbound messages into the paired [`MemoryEvents`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pg_protocol::ORCHESTRATOR_NODE;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{EventSource, Transport, TransportEvent};
use crate::types::TransportError;

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub message: Value,
}

#[derive(Default)]
struct Shared {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
}

/// Recording transport.  Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.shared.published.lock().clone()
    }

    /// Bodies of every published envelope carrying `kind` as a top-level key.
    pub fn published_of(&self, kind: &str) -> Vec<Value> {
        self.shared
            .published
            .lock()
            .iter()
            .filter_map(|p| p.message.get(kind).cloned())
            .collect()
    }

    pub fn clear(&self) {
        self.shared.published.lock().clear();
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions.lock().clone()
    }

    /// Make every subsequent publish fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.shared.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent subscribe fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.shared.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Wait until at least `count` envelopes of `kind` were published.
    pub async fn wait_for(&self, kind: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.published_of(kind).len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Transport for MemoryTransport {
    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        if self.shared.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("subscribe disabled".into()));
        }
        self.shared.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.shared.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("publish disabled".into()));
        }
        let message = serde_json::from_slice(&payload)
            .map_err(|e| TransportError::Rejected(format!("payload is not JSON: {e}")))?;
        self.shared.published.lock().push(Published {
            topic: topic.to_string(),
            message,
        });
        Ok(())
    }
}

/// Injects events into a [`MemoryEvents`].
#[derive(Clone)]
pub struct MemoryBroker {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

pub struct MemoryEvents {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

pub fn channel() -> (MemoryBroker, MemoryEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryBroker { tx }, MemoryEvents { rx })
}

impl MemoryBroker {
    pub fn connect(&self) {
        let _ = self.tx.send(TransportEvent::Connected);
    }

    pub fn disconnect(&self, reason: &str) {
        let _ = self.tx.send(TransportEvent::Disconnected(reason.to_string()));
    }

    pub fn deliver(&self, topic: &str, message: &Value) {
        let _ = self.tx.send(TransportEvent::Message {
            topic: topic.to_string(),
            payload: message.to_string().into_bytes(),
        });
    }

    pub fn deliver_raw(&self, topic: &str, payload: &[u8]) {
        let _ = self.tx.send(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Deliver `body` on the profile's input topic, stamped as coming from
    /// the orchestrator.
    pub fn from_orchestrator(&self, profile: u32, mut body: Value) {
        if let Value::Object(obj) = &mut body {
            obj.insert("node".into(), Value::String(ORCHESTRATOR_NODE.into()));
        }
        self.deliver(&pg_protocol::input_topic(profile), &body);
    }
}

#[async_trait::async_trait]
impl EventSource for MemoryEvents {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
