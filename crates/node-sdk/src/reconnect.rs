//! Pause between MQTT event-loop polls after a transport failure.
//!
//! The session layer never reconnects on its own.  The MQTT event loop
//! re-dials on the next poll, and this policy decides how long to wait first.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectBackoff {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// Consecutive failures tolerated before the event source gives up.
    /// `0` never gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            factor: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectBackoff {
    /// Delay before retry number `failures` (0-indexed), capped at
    /// `max_delay_ms` and spread by up to 20% jitter.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = self.factor.max(1.0).powi(failures.min(32) as i32);
        let base = (self.initial_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let jitter = base * 0.2 * jitter_fraction();
        Duration::from_millis((base + jitter) as u64)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }
}

fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}
