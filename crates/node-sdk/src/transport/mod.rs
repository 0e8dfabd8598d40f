//! Transport seam between the session layer and the pub/sub broker.
//!
//! The session manager consumes [`TransportEvent`]s from an [`EventSource`]
//! one at a time and talks back through a shared [`Transport`].  Publishing
//! is synchronous and non-blocking: implementations enqueue and return.

pub mod memory;
pub mod mqtt;

use crate::types::TransportError;

/// Outgoing half: shared by the publisher and the session manager.
pub trait Transport: Send + Sync + 'static {
    fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Something the broker connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    Disconnected(String),
}

/// Incoming half: owned by the session loop.
///
/// `None` means the source is finished and will never produce another event.
#[async_trait::async_trait]
pub trait EventSource: Send + 'static {
    async fn next_event(&mut self) -> Option<TransportEvent>;
}
