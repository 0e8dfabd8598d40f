//! Per-process session state: profile identity, connection state, and the
//! orchestrator's last delivered configuration.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct Session {
    profile: u32,
    state: Mutex<ConnectionState>,
    connected: AtomicBool,
    config: RwLock<Option<Value>>,
    doc_sent: AtomicBool,
}

impl Session {
    pub fn new(profile: u32) -> Self {
        Self {
            profile,
            state: Mutex::new(ConnectionState::Disconnected),
            connected: AtomicBool::new(false),
            config: RwLock::new(None),
            doc_sent: AtomicBool::new(false),
        }
    }

    pub fn profile(&self) -> u32 {
        self.profile
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::info!(profile = self.profile, from = ?*state, to = ?next, "session state");
        }
        *state = next;
        self.connected
            .store(next == ConnectionState::Connected, Ordering::SeqCst);
    }

    /// Copy of the cached configuration, if one was delivered.
    pub fn config(&self) -> Option<Value> {
        self.config.read().clone()
    }

    /// Replace the cached configuration wholesale.
    pub(crate) fn replace_config(&self, config: Value) {
        *self.config.write() = Some(config);
    }

    /// Copy of one object-valued sub-tree of the cached configuration.
    ///
    /// Returns `None` (and logs) when there is no config, the key is absent,
    /// or the value is not an object.
    pub fn config_section(&self, key: &str) -> Option<Map<String, Value>> {
        let config = self.config.read();
        let Some(config) = config.as_ref() else {
            tracing::debug!(section = key, "no configuration received yet");
            return None;
        };
        match config.get(key) {
            Some(Value::Object(obj)) => Some(obj.clone()),
            Some(_) => {
                tracing::warn!(section = key, "config section is not an object");
                None
            }
            None => {
                tracing::debug!(section = key, "config section absent");
                None
            }
        }
    }

    /// `true` exactly once per session: the caller that wins publishes the doc.
    pub(crate) fn claim_doc_send(&self) -> bool {
        !self.doc_sent.swap(true, Ordering::SeqCst)
    }
}
