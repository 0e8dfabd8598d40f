//! Node registry: the ordered set of nodes this node server exposes.

use parking_lot::RwLock;
use pg_protocol::{CommandRequest, Outbound, ALL_NODES};

use crate::interface::Interface;
use crate::node::NodeHandle;
use crate::publisher::Publisher;
use crate::types::CommandContext;

/// Thread-safe, insertion-ordered registry keyed by node address.
pub struct NodeRegistry {
    nodes: RwLock<Vec<NodeHandle>>,
    publisher: Publisher,
}

impl NodeRegistry {
    pub fn new(publisher: Publisher) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            publisher,
        }
    }

    /// Register `node` and announce it with its current drivers.
    ///
    /// A node whose address is already registered replaces the existing entry
    /// in place, so addresses stay unique and the original position is kept.
    pub fn add(&self, node: &NodeHandle) {
        let replaced = {
            let mut nodes = self.nodes.write();
            match nodes.iter().position(|n| n.address() == node.address()) {
                Some(i) => {
                    let old = std::mem::replace(&mut nodes[i], node.clone());
                    Some(old)
                }
                None => {
                    nodes.push(node.clone());
                    None
                }
            }
        };

        if let Some(old) = replaced {
            if !old.same_node(node) {
                old.set_added(false);
            }
            tracing::warn!(address = %node.address(), "node re-added, replacing existing entry");
        }
        node.set_added(true);

        tracing::info!(
            address = %node.address(),
            node_def_id = %node.id(),
            drivers = node.driver_count(),
            "node added"
        );
        self.publisher.send_message(&Outbound::AddNode {
            nodes: vec![node.to_def()],
        });
    }

    /// Ask the orchestrator to remove `address` and drop it locally.
    ///
    /// Returns whether the node was registered here.
    pub fn delete(&self, address: &str) -> bool {
        self.publisher.send_message(&Outbound::RemoveNode {
            address: address.to_string(),
        });

        let removed = {
            let mut nodes = self.nodes.write();
            let index = nodes.iter().position(|n| n.address() == address);
            index.map(|i| nodes.remove(i))
        };

        match removed {
            Some(node) => {
                node.set_added(false);
                tracing::info!(address = %address, "node removed");
                true
            }
            None => {
                tracing::warn!(address = %address, "delete: node not in registry");
                false
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<NodeHandle> {
        let found = self
            .nodes
            .read()
            .iter()
            .find(|n| n.address() == address)
            .cloned();
        if found.is_none() {
            tracing::warn!(address = %address, "node not in registry");
        }
        found
    }

    /// Snapshot of every node in insertion order.
    pub fn all(&self) -> Vec<NodeHandle> {
        self.nodes.read().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .map(|n| n.address().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Run `query` on `address`, or on every node for `"all"`.
    pub fn query(&self, address: &str) {
        for node in self.targets(address) {
            node.query();
        }
    }

    /// Report all drivers of `address`, or of every node for `"all"`.
    pub fn status(&self, address: &str) {
        for node in self.targets(address) {
            node.report_drivers();
        }
    }

    fn targets(&self, address: &str) -> Vec<NodeHandle> {
        if address == ALL_NODES {
            self.all()
        } else {
            self.get(address).into_iter().collect()
        }
    }

    /// Route an inbound command to its node's handler and await it.
    ///
    /// Unknown nodes and command ids are logged and ignored.  Returns whether
    /// a handler ran.
    pub async fn run_command(&self, iface: Interface, req: CommandRequest) -> bool {
        let Some(node) = self.get(&req.address) else {
            tracing::warn!(address = %req.address, cmd = %req.cmd, "command for unknown node");
            return false;
        };
        let Some(handler) = node.command(&req.cmd) else {
            tracing::warn!(address = %req.address, cmd = %req.cmd, "node has no such command");
            return false;
        };

        tracing::debug!(
            address = %req.address,
            cmd = %req.cmd,
            value = %req.value,
            uom = req.uom,
            "running command"
        );
        handler
            .call(CommandContext {
                iface,
                node,
                cmd: req.cmd,
                value: req.value,
                uom: req.uom,
            })
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryTransport, Publisher, NodeRegistry) {
        let t = MemoryTransport::new();
        let p = Publisher::new(Arc::new(t.clone()), 2);
        let reg = NodeRegistry::new(p.clone());
        (t, p, reg)
    }

    fn make(p: &Publisher, address: &str) -> NodeHandle {
        let n = NodeHandle::new(p.clone(), "generic", "ctl", address, address.to_uppercase());
        n.add_driver("ST", "0", 2);
        n
    }

    #[test]
    fn add_preserves_order_and_announces() {
        let (t, p, reg) = setup();
        for a in ["ctl", "n1", "n2"] {
            reg.add(&make(&p, a));
        }
        assert_eq!(reg.addresses(), vec!["ctl", "n1", "n2"]);
        assert!(reg.get("n1").unwrap().added());

        let adds = t.published_of("addnode");
        assert_eq!(adds.len(), 3);
        assert_eq!(
            adds[1],
            json!({"nodes": [{
                "address": "n1", "name": "N1", "node_def_id": "generic", "primary": "ctl",
                "hint": 0, "drivers": [{"driver": "ST", "value": "0", "uom": 2}]
            }]})
        );
    }

    #[test]
    fn re_adding_an_address_replaces_in_place() {
        let (_, p, reg) = setup();
        let first = make(&p, "n1");
        reg.add(&first);
        reg.add(&make(&p, "n2"));
        let second = make(&p, "n1");
        reg.add(&second);

        assert_eq!(reg.addresses(), vec!["n1", "n2"]);
        assert!(reg.get("n1").unwrap().same_node(&second));
        assert!(!first.added());
    }

    #[test]
    fn delete_head_interior_and_tail() {
        for victim in ["a", "b", "c"] {
            let (t, p, reg) = setup();
            for a in ["a", "b", "c"] {
                reg.add(&make(&p, a));
            }
            let handle = reg.get(victim).unwrap();

            assert!(reg.delete(victim));
            assert!(reg.get(victim).is_none());
            assert!(!reg.addresses().contains(&victim.to_string()));
            assert_eq!(reg.len(), 2);
            assert!(!handle.added());
            assert_eq!(t.published_of("removenode"), vec![json!({"address": victim})]);
        }
    }

    #[test]
    fn delete_unknown_still_asks_orchestrator() {
        let (t, _, reg) = setup();
        assert!(!reg.delete("ghost"));
        assert_eq!(t.published_of("removenode").len(), 1);
    }

    #[test]
    fn status_all_reports_every_node() {
        let (t, p, reg) = setup();
        for a in ["a", "b", "c"] {
            reg.add(&make(&p, a));
        }
        t.clear();
        reg.status(ALL_NODES);
        let addrs: Vec<_> = t
            .published_of("status")
            .iter()
            .map(|s| s["address"].clone())
            .collect();
        assert_eq!(addrs, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn query_single_address_past_the_head() {
        let (t, p, reg) = setup();
        for a in ["a", "b", "c"] {
            reg.add(&make(&p, a));
        }
        t.clear();
        reg.query("c");
        let statuses = t.published_of("status");
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["address"], json!("c"));

        t.clear();
        reg.query("missing");
        assert!(t.published().is_empty());
    }
}
