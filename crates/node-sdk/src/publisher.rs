//! Outbound publisher: stamps the sender, serializes, and hands envelopes to
//! the transport.  Failures are logged and dropped, never retried.

use std::sync::Arc;

use pg_protocol::Outbound;
use serde_json::Value;

use crate::transport::Transport;

#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    profile: u32,
    topic: Arc<str>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, profile: u32) -> Self {
        Self {
            transport,
            profile,
            topic: pg_protocol::self_topic(profile).into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a raw envelope.  A missing `node` field is set to the profile.
    pub fn send(&self, envelope: Value) {
        let Value::Object(mut obj) = envelope else {
            tracing::warn!("refusing to publish a non-object envelope");
            return;
        };
        obj.entry("node")
            .or_insert_with(|| Value::String(self.profile.to_string()));

        let payload = match serde_json::to_vec(&Value::Object(obj)) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize envelope");
                return;
            }
        };

        if let Err(e) = self.transport.publish(&self.topic, payload) {
            tracing::warn!(topic = %self.topic, error = %e, "publish failed");
        }
    }

    pub fn send_message(&self, msg: &Outbound) {
        tracing::debug!(kind = msg.kind(), "publishing");
        match serde_json::to_value(msg) {
            Ok(v) => self.send(v),
            Err(e) => tracing::error!(kind = msg.kind(), error = %e, "failed to encode envelope"),
        }
    }
}
