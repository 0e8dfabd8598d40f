//! Polyglot node-server protocol: MQTT topics, inbound message classification,
//! and the outbound envelopes a node server publishes.
//!
//! Every message is a flat JSON object.  The `node` field names the sender
//! (`"polyglot"` for the orchestrator, the profile number for a node server)
//! and exactly one other top-level key names the message kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod inbound;
pub mod outbound;

pub use inbound::{CommandRequest, Envelope, InboundKind};
pub use outbound::{DriverDef, NodeDef, Outbound};

/// Identity the orchestrator stamps into the `node` field of its messages.
pub const ORCHESTRATOR_NODE: &str = "polyglot";

/// Address used by query/status requests that target every node.
pub const ALL_NODES: &str = "all";

/// Orchestrator broadcast topic every node server subscribes to.
pub const BROADCAST_TOPIC: &str = "udi/polyglot/connections/polyglot";

/// Topic the orchestrator uses to talk to a single profile.
pub fn input_topic(profile: u32) -> String {
    format!("udi/polyglot/ns/{profile}")
}

/// Topic a profile publishes everything on.
pub fn self_topic(profile: u32) -> String {
    format!("udi/polyglot/connections/{profile}")
}

/// Config sub-tree holding operator-visible notices.
pub const NOTICES_KEY: &str = "notices";

// ── Errors ───────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no `node` field")]
    MissingNode,
    #[error("field `{0}` is missing or has the wrong type")]
    InvalidField(&'static str),
}

// ── Key/value namespaces ─────────────────────────────────────────────

/// The two orchestrator-owned key/value namespaces.
///
/// Both live inside the delivered config under a camel-cased key and are
/// published back under a lower-cased key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Parameters,
    Data,
}

impl Namespace {
    /// Key of the sub-tree inside the cached config.
    pub fn config_key(self) -> &'static str {
        match self {
            Namespace::Parameters => "customParams",
            Namespace::Data => "customData",
        }
    }

    /// Key used when publishing the namespace back to the orchestrator.
    pub fn wire_key(self) -> &'static str {
        match self {
            Namespace::Parameters => "customparams",
            Namespace::Data => "customdata",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_key())
    }
}

// ── Pairs ────────────────────────────────────────────────────────────

/// A key/value record used for parameters, data and notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for Pair {
    fn from((key, value): (K, V)) -> Self {
        Pair::new(key, value)
    }
}

/// Text form of a config value: strings verbatim, anything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Materialize a flat JSON object as pairs, in object iteration order.
pub fn pairs_from_object(obj: &Map<String, Value>) -> Vec<Pair> {
    obj.iter()
        .map(|(k, v)| Pair::new(k.clone(), value_text(v)))
        .collect()
}

/// Build a flat JSON object from pairs.  Later pairs win on duplicate keys.
pub fn object_from_pairs(pairs: &[Pair]) -> Map<String, Value> {
    let mut obj = Map::new();
    for pair in pairs {
        obj.insert(pair.key.clone(), Value::String(pair.value.clone()));
    }
    obj
}
