//! The handle node-server code uses to talk to the orchestrator.
//!
//! `Interface` is cheap to clone; every clone shares one session, one
//! registry and one publisher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pg_protocol::Outbound;
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::node::NodeHandle;
use crate::notices::Notices;
use crate::params::ParamStore;
use crate::publisher::Publisher;
use crate::registry::NodeRegistry;
use crate::session::Session;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Interface {
    inner: Arc<Inner>,
}

struct Inner {
    session: Session,
    publisher: Publisher,
    registry: NodeRegistry,
    doc_path: PathBuf,
    tracker: TaskTracker,
}

impl Interface {
    pub fn new(profile: u32, transport: Arc<dyn Transport>, doc_path: impl Into<PathBuf>) -> Self {
        let publisher = Publisher::new(transport, profile);
        Self {
            inner: Arc::new(Inner {
                session: Session::new(profile),
                registry: NodeRegistry::new(publisher.clone()),
                publisher,
                doc_path: doc_path.into(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn profile(&self) -> u32 {
        self.inner.session.profile()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Last configuration delivered by the orchestrator.
    pub fn config(&self) -> Option<Value> {
        self.inner.session.config()
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn publisher(&self) -> &Publisher {
        &self.inner.publisher
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    pub fn doc_path(&self) -> &Path {
        &self.inner.doc_path
    }

    /// Tasks spawned on behalf of this interface (callbacks, temp notices).
    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    pub fn params(&self) -> ParamStore<'_> {
        ParamStore {
            session: &self.inner.session,
            publisher: &self.inner.publisher,
            doc_path: &self.inner.doc_path,
        }
    }

    pub fn notices(&self) -> Notices<'_> {
        Notices {
            session: &self.inner.session,
            publisher: &self.inner.publisher,
            tracker: &self.inner.tracker,
        }
    }

    /// Create a node bound to this interface.  It is not registered until
    /// passed to [`Interface::add_node`].
    pub fn alloc_node(
        &self,
        id: impl Into<String>,
        primary: impl Into<String>,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> NodeHandle {
        NodeHandle::new(self.inner.publisher.clone(), id, primary, address, name)
    }

    pub fn add_node(&self, node: &NodeHandle) {
        self.inner.registry.add(node);
    }

    pub fn delete_node(&self, address: &str) -> bool {
        self.inner.registry.delete(address)
    }

    pub fn get_node(&self, address: &str) -> Option<NodeHandle> {
        self.inner.registry.get(address)
    }

    pub fn get_nodes(&self) -> Vec<NodeHandle> {
        self.inner.registry.all()
    }

    /// Ask the orchestrator to reinstall this node server's profile files.
    pub fn install_profile(&self) {
        tracing::info!("requesting profile install");
        self.inner
            .publisher
            .send_message(&Outbound::InstallProfile { reboot: false });
    }

    /// Ask the orchestrator to restart this node server.
    pub fn restart(&self) {
        tracing::info!("requesting restart");
        self.inner.publisher.send_message(&Outbound::Restart {});
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("profile", &self.profile())
            .field("connected", &self.is_connected())
            .field("nodes", &self.inner.registry.len())
            .finish()
    }
}
