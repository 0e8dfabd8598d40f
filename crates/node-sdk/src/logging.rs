//! Tracing setup for node-server processes.
//!
//! Logs go to stderr: the orchestrator owns our stdin and may read stdout.
//! The filter sits behind a reload layer so handlers can change verbosity
//! while the session runs.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::types::InterfaceError;

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a text subscriber filtered by `RUST_LOG` (default `info`).
pub fn init() -> bool {
    init_with(LogFormat::Text)
}

/// Install a subscriber in `format`.  Returns `false` if one was already set.
pub fn init_with(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    let result = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if result.is_err() {
        return false;
    }
    let _ = FILTER.set(handle);
    true
}

/// Replace the active filter, e.g. `"debug"` or `"info,pg_node_sdk=trace"`.
///
/// Fails with `Config` when `directives` do not parse or no subscriber was
/// installed through [`init`].
pub fn set_level(directives: &str) -> Result<(), InterfaceError> {
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| InterfaceError::Config(format!("bad log filter {directives:?}: {e}")))?;
    let handle = FILTER
        .get()
        .ok_or_else(|| InterfaceError::Config("logging was not initialised".into()))?;
    handle
        .reload(filter)
        .map_err(|e| InterfaceError::Other(anyhow::anyhow!("reloading log filter: {e}")))?;
    tracing::info!(filter = directives, "log level changed");
    Ok(())
}
