//! MQTT transport backed by `rumqttc`.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    Transport as Wire,
};

use super::{EventSource, Transport, TransportEvent};
use crate::config::{Settings, TlsSettings};
use crate::reconnect::ReconnectBackoff;
use crate::types::{InterfaceError, TransportError};

/// Largest packet accepted in either direction.  Config and addnode
/// envelopes easily exceed the `rumqttc` default of 10 KB.
const MAX_PACKET_BYTES: usize = 1024 * 1024;

/// Publishing half of the broker connection.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

/// Event-loop half of the broker connection.
pub struct MqttEvents {
    eventloop: EventLoop,
    backoff: ReconnectBackoff,
    failures: u32,
    pending_delay: Option<Duration>,
}

/// Build the client and event loop.  Nothing touches the network until the
/// first [`MqttEvents::next_event`] call.
pub fn connect(settings: &Settings) -> Result<(MqttTransport, MqttEvents), InterfaceError> {
    let client_id = settings
        .client_id
        .clone()
        .unwrap_or_else(|| format!("pg-{}", uuid::Uuid::new_v4().simple()));

    let mut opts = MqttOptions::new(client_id.clone(), settings.host.clone(), settings.port);
    opts.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    opts.set_max_packet_size(MAX_PACKET_BYTES, MAX_PACKET_BYTES);

    let tls = settings.tls.clone().or_else(TlsSettings::discover);
    if let Some(tls) = &tls {
        opts.set_transport(tls_wire(tls)?);
    }

    tracing::info!(
        host = %settings.host,
        port = settings.port,
        client_id = %client_id,
        tls = tls.is_some(),
        "configured MQTT connection"
    );

    let (client, eventloop) = AsyncClient::new(opts, settings.request_capacity);
    Ok((
        MqttTransport { client },
        MqttEvents {
            eventloop,
            backoff: settings.reconnect.clone(),
            failures: 0,
            pending_delay: None,
        },
    ))
}

fn tls_wire(tls: &TlsSettings) -> Result<Wire, InterfaceError> {
    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|e| {
            InterfaceError::Connection(format!("reading {}: {e}", path.display()))
        })
    };
    let ca = read(&tls.ca)?;
    let cert = read(&tls.cert)?;
    let key = read(&tls.key)?;
    Ok(Wire::tls(ca, Some((cert, key)), None))
}

impl Transport for MqttTransport {
    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

#[async_trait::async_trait]
impl EventSource for MqttEvents {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(delay) = self.pending_delay.take() {
            tokio::time::sleep(delay).await;
        }

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.failures = 0;
                        return Some(TransportEvent::Connected);
                    }
                    return Some(self.failed(format!("broker refused connection: {:?}", ack.code)));
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Some(TransportEvent::Message {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Some(TransportEvent::Disconnected("broker sent disconnect".into()));
                }
                Ok(_) => continue,
                Err(e) => {
                    if self.backoff.exhausted(self.failures) {
                        tracing::error!(failures = self.failures, "giving up on MQTT connection");
                        return None;
                    }
                    return Some(self.failed(e.to_string()));
                }
            }
        }
    }
}

impl MqttEvents {
    /// Record a failure and schedule the pause before the next poll re-dials.
    fn failed(&mut self, reason: String) -> TransportEvent {
        let delay = self.backoff.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.pending_delay = Some(delay);
        tracing::debug!(
            failures = self.failures,
            delay_ms = delay.as_millis() as u64,
            "MQTT poll failed"
        );
        TransportEvent::Disconnected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_tls_material_is_a_connection_error() {
        let settings = Settings {
            profile: 1,
            tls: Some(TlsSettings::in_dir("/nonexistent/pg-ssl")),
            ..Settings::default()
        };
        let err = connect(&settings).err().unwrap();
        assert!(matches!(err, InterfaceError::Connection(_)));
    }

    #[tokio::test]
    async fn publish_is_queued_without_network() {
        let settings = Settings {
            profile: 1,
            ..Settings::default()
        };
        let (transport, _events) = connect(&settings).unwrap();
        assert!(transport
            .publish("udi/polyglot/connections/1", b"{}".to_vec())
            .is_ok());
    }
}
