//! Startup input and runtime settings.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::reconnect::ReconnectBackoff;
use crate::types::InterfaceError;

// ── Startup line ─────────────────────────────────────────────────────

/// The single JSON line the orchestrator writes to a node server's stdin
/// before the session starts.
///
/// ```json
/// {"mqttHost": "localhost", "mqttPort": "1883", "profileNum": "17"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupInfo {
    pub mqtt_host: String,
    #[serde(deserialize_with = "number_or_string")]
    pub mqtt_port: u16,
    #[serde(deserialize_with = "number_or_string")]
    pub profile_num: u32,
}

impl StartupInfo {
    pub fn parse(line: &str) -> Result<Self, InterfaceError> {
        serde_json::from_str(line.trim())
            .map_err(|e| InterfaceError::Startup(format!("malformed startup line: {e}")))
    }

    /// Read exactly one line from `reader`.
    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, InterfaceError> {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| InterfaceError::Startup(format!("reading startup line: {e}")))?;
        if n == 0 || line.trim().is_empty() {
            return Err(InterfaceError::Startup("no startup line on input".into()));
        }
        Self::parse(&line)
    }

    pub fn from_stdin() -> Result<Self, InterfaceError> {
        Self::from_reader(std::io::stdin().lock())
    }
}

fn number_or_string<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<u64>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Num(n) => T::try_from(n).map_err(|_| serde::de::Error::custom("number out of range")),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {s:?}"))),
    }
}

// ── TLS ──────────────────────────────────────────────────────────────

const CA_FILE: &str = "polyglot.crt";
const CERT_FILE: &str = "client.crt";
const KEY_FILE: &str = "client_private.key";
const SYSTEM_SSL_DIR: &str = "/var/polyglot/ssl";

/// Client certificate material for the broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsSettings {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ca: dir.join(CA_FILE),
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.ca.is_file() && self.cert.is_file() && self.key.is_file()
    }

    /// First complete certificate set among `$HOME/ssl` and `/var/polyglot/ssl`.
    pub fn discover() -> Option<Self> {
        let mut dirs = Vec::new();
        if let Some(home) = std::env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join("ssl"));
        }
        dirs.push(PathBuf::from(SYSTEM_SSL_DIR));
        dirs.into_iter().map(Self::in_dir).find(Self::exists)
    }
}

// ── Settings ─────────────────────────────────────────────────────────

/// Everything the client needs to run a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub profile: u32,
    /// MQTT client id; a random one is generated when unset.
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub tls: Option<TlsSettings>,
    /// Markdown source published once per session as `customparamsdoc`.
    pub doc_path: PathBuf,
    /// How long shutdown waits for in-flight handlers.
    pub drain_timeout_ms: u64,
    /// Capacity of the MQTT client's outgoing request queue.
    pub request_capacity: usize,
    pub reconnect: ReconnectBackoff,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            profile: 0,
            client_id: None,
            keep_alive_secs: 30,
            tls: None,
            doc_path: PathBuf::from("POLYGLOT_CONFIG.md"),
            drain_timeout_ms: 10_000,
            request_capacity: 64,
            reconnect: ReconnectBackoff::default(),
        }
    }
}

impl Settings {
    pub fn from_startup(info: &StartupInfo) -> Self {
        Self {
            host: info.mqtt_host.clone(),
            port: info.mqtt_port,
            profile: info.profile_num,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), InterfaceError> {
        if self.host.trim().is_empty() {
            return Err(InterfaceError::Config("host is required".into()));
        }
        if self.port == 0 {
            return Err(InterfaceError::Config("port must be non-zero".into()));
        }
        if self.profile == 0 {
            return Err(InterfaceError::Config(
                "profile is required (pass the startup line)".into(),
            ));
        }
        if self.request_capacity == 0 {
            return Err(InterfaceError::Config("request_capacity must be non-zero".into()));
        }
        Ok(())
    }
}
