//! Notice board: short messages shown on the orchestrator's dashboard.

use std::time::Duration;

use pg_protocol::{pairs_from_object, Outbound, Pair, NOTICES_KEY};
use tokio_util::task::TaskTracker;

use crate::publisher::Publisher;
use crate::session::Session;

pub struct Notices<'a> {
    pub(crate) session: &'a Session,
    pub(crate) publisher: &'a Publisher,
    pub(crate) tracker: &'a TaskTracker,
}

impl Notices<'_> {
    pub fn add(&self, key: &str, text: &str) {
        tracing::info!(key, "adding notice");
        self.publisher.send_message(&Outbound::AddNotice {
            key: key.to_string(),
            value: text.to_string(),
        });
    }

    /// Add a notice that is removed again after `ttl`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn add_temp(&self, key: &str, text: &str, ttl: Duration) {
        self.add(key, text);
        let publisher = self.publisher.clone();
        let key = key.to_string();
        self.tracker.spawn(async move {
            tokio::time::sleep(ttl).await;
            tracing::debug!(key = %key, "temporary notice expired");
            publisher.send_message(&Outbound::RemoveNotice { key });
        });
    }

    pub fn remove(&self, key: &str) {
        tracing::info!(key, "removing notice");
        self.publisher.send_message(&Outbound::RemoveNotice {
            key: key.to_string(),
        });
    }

    /// Remove every notice in the cached config.  Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let notices = self.get_all();
        for notice in &notices {
            self.remove(&notice.key);
        }
        notices.len()
    }

    /// Notices currently known to the orchestrator, in config order.
    pub fn get_all(&self) -> Vec<Pair> {
        self.session
            .config_section(NOTICES_KEY)
            .map(|obj| pairs_from_object(&obj))
            .unwrap_or_default()
    }
}
