//! Nodes: virtual devices a node server exposes to the orchestrator.
//!
//! A [`NodeHandle`] is a cheap-to-clone reference to one node.  Its driver,
//! command and send tables sit behind a per-node lock, so poll-driven and
//! command-driven updates can race without tearing a read-modify-write.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use pg_protocol::{DriverDef, NodeDef, Outbound};

use crate::publisher::Publisher;
use crate::types::CommandContext;

/// A named, unit-typed state value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    pub name: String,
    pub value: String,
    pub uom: i32,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Handles one command id on one node.
///
/// Any `Fn(CommandContext) -> impl Future<Output = ()>` closure implements
/// this trait:
///
/// ```rust,no_run
/// # use pg_node_sdk::{CommandContext, NodeHandle};
/// # fn wire(node: &NodeHandle) {
/// node.add_command("DON", |ctx: CommandContext| async move {
///     ctx.node.set_driver("ST", "100", true, false, 51);
/// });
/// # }
/// ```
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn call(&self, ctx: CommandContext);
}

#[async_trait::async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, ctx: CommandContext) {
        (self)(ctx).await
    }
}

/// The reporting operations of a node.
///
/// Every method has the standard behaviour as its default; node servers
/// override individual operations per node role (e.g. a controller whose
/// `query` reports every node).
pub trait NodeOps: Send + Sync + 'static {
    /// Store a driver value and optionally report it.  Reporting is skipped
    /// when neither value nor uom changed, unless `force` is set.
    fn set_driver(
        &self,
        node: &NodeHandle,
        driver: &str,
        value: &str,
        report: bool,
        force: bool,
        uom: i32,
    ) {
        let Some(changed) = node.store_driver(driver, value, uom) else {
            tracing::warn!(address = %node.address(), driver, "set_driver: no such driver");
            return;
        };
        if report {
            self.report_driver(node, driver, changed, force);
        }
    }

    fn report_driver(&self, node: &NodeHandle, driver: &str, changed: bool, force: bool) {
        let Some(d) = node.driver(driver) else {
            tracing::warn!(address = %node.address(), driver, "report_driver: no such driver");
            return;
        };
        if changed || force {
            node.publisher().send_message(&status(node, d));
        }
    }

    /// Report every driver unconditionally.
    fn report_drivers(&self, node: &NodeHandle) {
        for d in node.drivers() {
            node.publisher().send_message(&status(node, d));
        }
    }

    fn report_cmd(&self, node: &NodeHandle, send_id: &str, value: Option<&str>, uom: i32) {
        if node.send_handler(send_id).is_none() {
            tracing::warn!(address = %node.address(), send = send_id, "report_cmd: no such send");
            return;
        }
        node.publisher().send_message(&Outbound::Command {
            address: node.address().to_string(),
            command: send_id.to_string(),
            uom,
            value: value.map(str::to_string),
        });
    }

    fn query(&self, node: &NodeHandle) {
        self.report_drivers(node);
    }
}

/// The standard operation set every node starts with.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNodeOps;

impl NodeOps for DefaultNodeOps {}

fn status(node: &NodeHandle, d: Driver) -> Outbound {
    Outbound::Status {
        address: node.address().to_string(),
        driver: d.name,
        value: d.value,
        uom: d.uom,
    }
}

// ── Node ─────────────────────────────────────────────────────────────

struct Entry {
    id: String,
    handler: Arc<dyn CommandHandler>,
}

struct Tables {
    enabled: bool,
    added: bool,
    hint: u32,
    drivers: Vec<Driver>,
    commands: Vec<Entry>,
    sends: Vec<Entry>,
}

struct NodeInner {
    id: String,
    name: String,
    address: String,
    primary: String,
    tables: Mutex<Tables>,
    ops: RwLock<Arc<dyn NodeOps>>,
    publisher: Publisher,
}

#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    pub(crate) fn new(
        publisher: Publisher,
        id: impl Into<String>,
        primary: impl Into<String>,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: id.into(),
                name: name.into(),
                address: address.into(),
                primary: primary.into(),
                tables: Mutex::new(Tables {
                    enabled: false,
                    added: false,
                    hint: 0,
                    drivers: Vec::new(),
                    commands: Vec::new(),
                    sends: Vec::new(),
                }),
                ops: RwLock::new(Arc::new(DefaultNodeOps)),
                publisher,
            }),
        }
    }

    /// Node definition id (`node_def_id` on the wire).
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn primary(&self) -> &str {
        &self.inner.primary
    }

    pub fn is_primary(&self) -> bool {
        self.inner.address == self.inner.primary
    }

    pub fn enabled(&self) -> bool {
        self.inner.tables.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.tables.lock().enabled = enabled;
    }

    /// Whether the node is currently registered with the orchestrator.
    pub fn added(&self) -> bool {
        self.inner.tables.lock().added
    }

    pub(crate) fn set_added(&self, added: bool) {
        self.inner.tables.lock().added = added;
    }

    pub fn hint(&self) -> u32 {
        self.inner.tables.lock().hint
    }

    pub fn set_hint(&self, hint: u32) {
        self.inner.tables.lock().hint = hint;
    }

    pub fn publisher(&self) -> &Publisher {
        &self.inner.publisher
    }

    /// Replace the node's operation set.
    pub fn set_ops(&self, ops: impl NodeOps) {
        *self.inner.ops.write() = Arc::new(ops);
    }

    fn ops(&self) -> Arc<dyn NodeOps> {
        self.inner.ops.read().clone()
    }

    /// Two handles refer to the same node instance.
    pub fn same_node(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Tables ───────────────────────────────────────────────────────

    /// Append a driver.  Duplicate names are kept; lookups see the first.
    pub fn add_driver(&self, name: impl Into<String>, init: impl Into<String>, uom: i32) -> &Self {
        let mut t = self.inner.tables.lock();
        t.drivers.push(Driver {
            name: name.into(),
            value: init.into(),
            uom,
        });
        tracing::debug!(address = %self.inner.address, drivers = t.drivers.len(), "driver added");
        drop(t);
        self
    }

    pub fn add_command(&self, id: impl Into<String>, handler: impl CommandHandler) -> &Self {
        self.inner.tables.lock().commands.push(Entry {
            id: id.into(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn add_send(&self, id: impl Into<String>, handler: impl CommandHandler) -> &Self {
        self.inner.tables.lock().sends.push(Entry {
            id: id.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// First driver named `name`.
    pub fn driver(&self, name: &str) -> Option<Driver> {
        self.inner
            .tables
            .lock()
            .drivers
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.inner.tables.lock().drivers.clone()
    }

    pub fn driver_count(&self) -> usize {
        self.inner.tables.lock().drivers.len()
    }

    pub fn command(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        lookup(&self.inner.tables.lock().commands, id)
    }

    pub fn command_ids(&self) -> Vec<String> {
        self.inner
            .tables
            .lock()
            .commands
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn send_handler(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        lookup(&self.inner.tables.lock().sends, id)
    }

    /// Overwrite the first driver named `name`.  Returns whether value or uom
    /// changed, or `None` if the node has no such driver.
    pub fn store_driver(&self, name: &str, value: &str, uom: i32) -> Option<bool> {
        let mut t = self.inner.tables.lock();
        let d = t.drivers.iter_mut().find(|d| d.name == name)?;
        let changed = d.value != value || d.uom != uom;
        d.value = value.to_string();
        d.uom = uom;
        Some(changed)
    }

    // ── Operations ───────────────────────────────────────────────────

    pub fn set_driver(&self, driver: &str, value: &str, report: bool, force: bool, uom: i32) {
        self.ops().set_driver(self, driver, value, report, force, uom);
    }

    pub fn report_driver(&self, driver: &str, changed: bool, force: bool) {
        self.ops().report_driver(self, driver, changed, force);
    }

    pub fn report_drivers(&self) {
        self.ops().report_drivers(self);
    }

    /// Tell the orchestrator this node sent command `send_id`.
    pub fn report_cmd(&self, send_id: &str, value: Option<&str>, uom: i32) {
        self.ops().report_cmd(self, send_id, value, uom);
    }

    pub fn query(&self) {
        self.ops().query(self);
    }

    /// Wire definition with a snapshot of the current drivers.
    pub fn to_def(&self) -> NodeDef {
        let t = self.inner.tables.lock();
        NodeDef {
            address: self.inner.address.clone(),
            name: self.inner.name.clone(),
            node_def_id: self.inner.id.clone(),
            primary: self.inner.primary.clone(),
            hint: t.hint,
            drivers: t
                .drivers
                .iter()
                .map(|d| DriverDef {
                    driver: d.name.clone(),
                    value: d.value.clone(),
                    uom: d.uom,
                })
                .collect(),
        }
    }
}

fn lookup(entries: &[Entry], id: &str) -> Option<Arc<dyn CommandHandler>> {
    entries.iter().find(|e| e.id == id).map(|e| e.handler.clone())
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address)
            .field("primary", &self.inner.primary)
            .field("drivers", &self.driver_count())
            .finish()
    }
}
