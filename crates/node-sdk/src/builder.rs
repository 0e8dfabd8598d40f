//! Builder pattern for constructing a [`PolyglotClient`].

use std::path::PathBuf;
use std::time::Duration;

use crate::client::PolyglotClient;
use crate::config::{Settings, StartupInfo, TlsSettings};
use crate::reconnect::ReconnectBackoff;
use crate::types::InterfaceError;

/// Fluent builder for [`PolyglotClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use pg_node_sdk::PolyglotClientBuilder;
/// let client = PolyglotClientBuilder::from_stdin()
///     .unwrap()
///     .doc_path("POLYGLOT_CONFIG.md")
///     .drain_timeout(std::time::Duration::from_secs(5))
///     .build()
///     .unwrap();
/// ```
pub struct PolyglotClientBuilder {
    settings: Settings,
}

impl PolyglotClientBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    /// Start from fully deserialized settings.
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Read the startup line the orchestrator writes to our stdin.
    pub fn from_stdin() -> Result<Self, InterfaceError> {
        Ok(Self::new().startup(&StartupInfo::from_stdin()?))
    }

    // ── Broker ───────────────────────────────────────────────────────

    /// Take host, port and profile from a startup line.
    pub fn startup(mut self, info: &StartupInfo) -> Self {
        self.settings.host = info.mqtt_host.clone();
        self.settings.port = info.mqtt_port;
        self.settings.profile = info.profile_num;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    pub fn profile(mut self, profile: u32) -> Self {
        self.settings.profile = profile;
        self
    }

    /// Fixed MQTT client id (default: random per process).
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.settings.client_id = Some(id.into());
        self
    }

    /// Explicit TLS material; otherwise the standard locations are searched.
    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.settings.tls = Some(tls);
        self
    }

    /// MQTT keep-alive.  The protocol counts whole seconds, so partial
    /// seconds round up.
    pub fn keep_alive(mut self, d: Duration) -> Self {
        let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
        self.settings.keep_alive_secs = secs.max(1);
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Markdown file published as parameter documentation (default
    /// `POLYGLOT_CONFIG.md`).
    pub fn doc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.doc_path = path.into();
        self
    }

    /// How long shutdown waits for running handlers (default 10s,
    /// millisecond precision).
    pub fn drain_timeout(mut self, d: Duration) -> Self {
        self.settings.drain_timeout_ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.settings.reconnect = cfg;
        self
    }

    /// Outgoing MQTT request queue depth (default 64).
    pub fn request_capacity(mut self, n: usize) -> Self {
        self.settings.request_capacity = n;
        self
    }

    pub fn build(self) -> Result<PolyglotClient, InterfaceError> {
        self.settings.validate()?;
        Ok(PolyglotClient {
            settings: self.settings,
        })
    }
}

impl Default for PolyglotClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_once_profile_is_set() {
        let client = PolyglotClientBuilder::new().profile(2).build().unwrap();
        assert_eq!(client.settings().host, "localhost");
        assert_eq!(client.settings().port, 1883);
        assert!(client.settings().client_id.is_none());
    }

    #[test]
    fn missing_profile_is_rejected() {
        let err = PolyglotClientBuilder::new().host("broker").build().err().unwrap();
        assert!(matches!(err, InterfaceError::Config(_)));
    }

    #[test]
    fn sub_second_durations_are_kept() {
        let client = PolyglotClientBuilder::new()
            .profile(1)
            .drain_timeout(Duration::from_millis(1500))
            .keep_alive(Duration::from_millis(2500))
            .build()
            .unwrap();
        assert_eq!(client.settings().drain_timeout_ms, 1500);
        assert_eq!(client.settings().keep_alive_secs, 3);

        let client = PolyglotClientBuilder::new()
            .profile(1)
            .drain_timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        assert_eq!(client.settings().drain_timeout_ms, 500);
    }

    #[test]
    fn startup_line_sets_broker_and_profile() {
        let info = StartupInfo::parse(
            r#"{"mqttHost": "10.1.1.1", "mqttPort": 8883, "profileNum": 6}"#,
        )
        .unwrap();
        let client = PolyglotClientBuilder::new()
            .startup(&info)
            .doc_path("docs/params.md")
            .drain_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let s = client.settings();
        assert_eq!((s.host.as_str(), s.port, s.profile), ("10.1.1.1", 8883, 6));
        assert_eq!(s.doc_path, PathBuf::from("docs/params.md"));
        assert_eq!(s.drain_timeout_ms, 2_000);
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = PolyglotClientBuilder::new().host("  ").build().err().unwrap();
        assert!(matches!(err, InterfaceError::Config(_)));
        assert_eq!(err.exit_code(), -4);
    }
}
