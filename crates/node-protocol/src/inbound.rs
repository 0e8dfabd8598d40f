//! Inbound envelopes: sender check and message-kind classification.

use serde_json::{Map, Value};

use crate::{ProtocolError, ORCHESTRATOR_NODE};

/// A decoded inbound message whose kind has not been classified yet.
///
/// Classification is deferred so that messages from other senders can be
/// dropped without validating their bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender identity, numbers rendered as decimal text.
    pub node: String,
    fields: Map<String, Value>,
}

/// What the orchestrator asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    Connected,
    Config(Value),
    ShortPoll,
    LongPoll,
    Command(CommandRequest),
    Query { address: String },
    Status { address: String },
    Unhandled,
}

impl InboundKind {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InboundKind::Connected => "connected",
            InboundKind::Config(_) => "config",
            InboundKind::ShortPoll => "shortPoll",
            InboundKind::LongPoll => "longPoll",
            InboundKind::Command(_) => "command",
            InboundKind::Query { .. } => "query",
            InboundKind::Status { .. } => "status",
            InboundKind::Unhandled => "unhandled",
        }
    }
}

/// A `command` request routed to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub address: String,
    pub cmd: String,
    /// Empty when the orchestrator sent no value.
    pub value: String,
    /// `0` when absent or unparsable.
    pub uom: i32,
}

impl Envelope {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let node = match fields.get("node") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(ProtocolError::InvalidField("node")),
            None => return Err(ProtocolError::MissingNode),
        };

        Ok(Self { node, fields })
    }

    pub fn is_from_orchestrator(&self) -> bool {
        self.node == ORCHESTRATOR_NODE
    }

    /// Classify by the first key present, in priority order:
    /// `connected`, `config`, `shortPoll`, `longPoll`, `command`, `query`, `status`.
    pub fn classify(&self) -> Result<InboundKind, ProtocolError> {
        let f = &self.fields;

        if f.contains_key("connected") {
            return Ok(InboundKind::Connected);
        }
        if let Some(config) = f.get("config") {
            if !config.is_object() {
                return Err(ProtocolError::InvalidField("config"));
            }
            return Ok(InboundKind::Config(config.clone()));
        }
        if f.contains_key("shortPoll") {
            return Ok(InboundKind::ShortPoll);
        }
        if f.contains_key("longPoll") {
            return Ok(InboundKind::LongPoll);
        }
        if let Some(cmd) = f.get("command") {
            return CommandRequest::from_value(cmd).map(InboundKind::Command);
        }
        if let Some(q) = f.get("query") {
            let address = target_address(q, "query")?;
            return Ok(InboundKind::Query { address });
        }
        if let Some(s) = f.get("status") {
            let address = target_address(s, "status")?;
            return Ok(InboundKind::Status { address });
        }

        Ok(InboundKind::Unhandled)
    }
}

fn target_address(body: &Value, field: &'static str) -> Result<String, ProtocolError> {
    body.get("address")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::InvalidField(field))
}

impl CommandRequest {
    fn from_value(body: &Value) -> Result<Self, ProtocolError> {
        let address = body
            .get("address")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::InvalidField("address"))?
            .to_string();
        let cmd = body
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::InvalidField("cmd"))?
            .to_string();

        let value = match body.get("value") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            address,
            cmd,
            value,
            uom: parse_uom(body.get("uom")),
        })
    }
}

fn parse_uom(raw: Option<&Value>) -> i32 {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
