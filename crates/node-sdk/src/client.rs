//! Session lifecycle: wait for the broker, announce ourselves, pump inbound
//! messages into the dispatcher until shutdown.

use std::sync::Arc;
use std::time::Duration;

use pg_protocol::{Outbound, BROADCAST_TOPIC};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::dispatch::{Dispatcher, NodeServer};
use crate::interface::Interface;
use crate::session::ConnectionState;
use crate::transport::{mqtt, EventSource, Transport, TransportEvent};
use crate::types::{InterfaceError, TransportError};

/// A fully-configured client ready to connect to the broker.
///
/// Create via [`PolyglotClientBuilder`](crate::builder::PolyglotClientBuilder).
pub struct PolyglotClient {
    pub(crate) settings: Settings,
}

impl PolyglotClient {
    pub fn builder() -> crate::builder::PolyglotClientBuilder {
        crate::builder::PolyglotClientBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Connect over MQTT and run the session until `shutdown` is cancelled.
    ///
    /// Returns `Err(InterfaceError::Shutdown)` after a requested shutdown, or
    /// a connection error if the broker never accepted us.
    pub async fn run(
        self,
        server: impl NodeServer,
        shutdown: CancellationToken,
    ) -> Result<(), InterfaceError> {
        let (transport, events) = mqtt::connect(&self.settings)?;
        SessionManager::new(&self.settings, Arc::new(transport))
            .run(events, Arc::new(server), shutdown)
            .await
    }

    /// Same as [`run`](Self::run), on a fresh task.
    pub fn spawn(
        self,
        server: impl NodeServer,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), InterfaceError>> {
        tokio::spawn(async move { self.run(server, shutdown).await })
    }
}

/// Drives one session over any [`Transport`] / [`EventSource`] pair.
pub struct SessionManager {
    iface: Interface,
    transport: Arc<dyn Transport>,
    drain_timeout: Duration,
}

impl SessionManager {
    pub fn new(settings: &Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            iface: Interface::new(settings.profile, transport.clone(), settings.doc_path.clone()),
            transport,
            drain_timeout: Duration::from_millis(settings.drain_timeout_ms),
        }
    }

    /// Handle shared with every callback; valid before and after `run`.
    pub fn interface(&self) -> Interface {
        self.iface.clone()
    }

    pub async fn run<E: EventSource>(
        self,
        mut events: E,
        server: Arc<dyn NodeServer>,
        shutdown: CancellationToken,
    ) -> Result<(), InterfaceError> {
        let profile = self.iface.profile();
        let session = self.iface.session();
        session.transition(ConnectionState::Connecting);

        // The first broker event decides whether we start at all.
        loop {
            let event = tokio::select! {
                ev = events.next_event() => ev,
                _ = shutdown.cancelled() => {
                    session.transition(ConnectionState::Disconnected);
                    return Err(InterfaceError::Shutdown);
                }
            };
            match event {
                Some(TransportEvent::Connected) => break,
                Some(TransportEvent::Message { topic, .. }) => {
                    tracing::debug!(topic = %topic, "message before connect, ignoring");
                }
                Some(TransportEvent::Disconnected(reason)) => {
                    session.transition(ConnectionState::Disconnected);
                    tracing::error!(profile, reason = %reason, "initial connection failed");
                    return Err(InterfaceError::Connection(reason));
                }
                None => {
                    session.transition(ConnectionState::Disconnected);
                    tracing::error!(profile, "transport closed before connecting");
                    return Err(InterfaceError::Connection(
                        "transport closed before connecting".into(),
                    ));
                }
            }
        }
        if let Err(e) = self.on_connected() {
            session.transition(ConnectionState::Disconnected);
            tracing::error!(profile, error = %e, "cannot subscribe to orchestrator topics");
            return Err(e.into());
        }

        let dispatcher = Dispatcher::new(self.iface.clone(), server);
        let cancelled = loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break true,
                ev = events.next_event() => ev,
            };
            match event {
                Some(TransportEvent::Message { topic, payload }) => {
                    tracing::trace!(topic = %topic, bytes = payload.len(), "inbound");
                    dispatcher.dispatch(&payload);
                }
                Some(TransportEvent::Connected) => {
                    tracing::info!(profile, "broker connection restored");
                    if let Err(e) = self.on_connected() {
                        tracing::warn!(profile, error = %e, "resubscribe failed");
                    }
                }
                Some(TransportEvent::Disconnected(reason)) => {
                    tracing::warn!(profile, reason = %reason, "broker connection lost");
                    session.transition(ConnectionState::Disconnected);
                }
                None => {
                    tracing::info!(profile, "transport finished");
                    break false;
                }
            }
        };

        session.transition(ConnectionState::Disconnected);
        dispatcher.drain(self.drain_timeout).await;

        if cancelled {
            tracing::info!(profile, "shutdown complete");
            Err(InterfaceError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Subscribe, announce, mark connected.  Nothing is announced unless
    /// both subscriptions were accepted.
    fn on_connected(&self) -> Result<(), TransportError> {
        let profile = self.iface.profile();
        for topic in [BROADCAST_TOPIC.to_string(), pg_protocol::input_topic(profile)] {
            self.transport.subscribe(&topic)?;
        }
        self.iface
            .publisher()
            .send_message(&Outbound::Connected(true));
        self.iface.session().transition(ConnectionState::Connected);
        tracing::info!(profile, topic = %self.iface.publisher().topic(), "connected to broker");
        Ok(())
    }
}
