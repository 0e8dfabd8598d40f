//! Envelopes a node server publishes to the orchestrator.
//!
//! Serialized externally tagged, so `Outbound::RemoveNode { address }` becomes
//! `{"removenode": {"address": "..."}}`.  The publisher adds the `node` field.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::Namespace;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outbound {
    /// Self-announce after the connection comes up.
    Connected(bool),
    AddNode {
        nodes: Vec<NodeDef>,
    },
    RemoveNode {
        address: String,
    },
    Status {
        address: String,
        driver: String,
        value: String,
        uom: i32,
    },
    Command {
        address: String,
        command: String,
        uom: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    AddNotice {
        key: String,
        value: String,
    },
    RemoveNotice {
        key: String,
    },
    CustomParams(Map<String, Value>),
    CustomData(Map<String, Value>),
    /// Rendered HTML of the parameter documentation.
    CustomParamsDoc(String),
    InstallProfile {
        reboot: bool,
    },
    Restart {},
}

impl Outbound {
    /// Full replacement of one namespace.
    pub fn namespace(ns: Namespace, content: Map<String, Value>) -> Self {
        match ns {
            Namespace::Parameters => Outbound::CustomParams(content),
            Namespace::Data => Outbound::CustomData(content),
        }
    }

    /// Wire key of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Connected(_) => "connected",
            Outbound::AddNode { .. } => "addnode",
            Outbound::RemoveNode { .. } => "removenode",
            Outbound::Status { .. } => "status",
            Outbound::Command { .. } => "command",
            Outbound::AddNotice { .. } => "addnotice",
            Outbound::RemoveNotice { .. } => "removenotice",
            Outbound::CustomParams(_) => "customparams",
            Outbound::CustomData(_) => "customdata",
            Outbound::CustomParamsDoc(_) => "customparamsdoc",
            Outbound::InstallProfile { .. } => "installprofile",
            Outbound::Restart {} => "restart",
        }
    }
}

/// Node metadata plus a driver snapshot, as carried by `addnode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDef {
    pub address: String,
    pub name: String,
    pub node_def_id: String,
    pub primary: String,
    pub hint: u32,
    pub drivers: Vec<DriverDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverDef {
    pub driver: String,
    pub value: String,
    pub uom: i32,
}
