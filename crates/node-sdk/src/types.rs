//! Core types for handler dispatch: command context and errors.

use crate::interface::Interface;
use crate::node::NodeHandle;

/// Context handed to every command handler invocation.
#[derive(Clone)]
pub struct CommandContext {
    /// Handle to the running interface (parameters, notices, registry).
    pub iface: Interface,
    /// The node the command was addressed to.
    pub node: NodeHandle,
    /// Command id, e.g. `"DON"`.
    pub cmd: String,
    /// Command value; empty when the orchestrator sent none.
    pub value: String,
    /// Unit of measure of `value`; `0` when absent.
    pub uom: i32,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("address", &self.node.address())
            .field("cmd", &self.cmd)
            .field("value", &self.value)
            .field("uom", &self.uom)
            .finish()
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Top-level interface error.
///
/// Only startup failures ever leave the library; everything that happens
/// after the session is up is logged and swallowed.
#[derive(thiserror::Error, Debug)]
pub enum InterfaceError {
    #[error("config: {0}")]
    Config(String),
    #[error("startup: {0}")]
    Startup(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl InterfaceError {
    /// Process exit status for this error.  Startup failures are negative
    /// and distinct so supervisors can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterfaceError::Connection(_) | InterfaceError::Transport(_) => -1,
            InterfaceError::Startup(_) => -2,
            InterfaceError::Config(_) => -4,
            InterfaceError::Other(_) => -5,
            InterfaceError::Shutdown => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_failures_have_distinct_codes() {
        let connect = InterfaceError::Connection("refused".into()).exit_code();
        let stdin = InterfaceError::Startup("no input".into()).exit_code();
        assert!(connect < 0);
        assert!(stdin < 0);
        assert_ne!(connect, stdin);
        assert_eq!(InterfaceError::Shutdown.exit_code(), 0);
    }

    #[test]
    fn transport_error_converts() {
        let err: InterfaceError = TransportError::Rejected("queue full".into()).into();
        assert_eq!(err.exit_code(), -1);
        assert_eq!(err.to_string(), "transport: request rejected: queue full");
    }
}
