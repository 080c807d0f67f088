// ── Runtime sync configuration ──
//
// Describes which switcher to mirror and how aggressively to poll and
// reconnect. Never touches disk: atemsync-config (or any host) builds a
// `SyncConfig` and hands it in.

use std::time::Duration;

use crate::error::CoreError;

/// Fixed-interval retry policy for the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Connect attempts per disconnect before giving up. Default: 3.
    pub max_attempts: u32,
    /// Sleep before each attempt. Default: 5s.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for mirroring a single switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Switcher network address (IP or hostname).
    pub address: String,
    /// Fallback poll interval. Zero disables polling.
    pub poll_interval: Duration,
    /// Wait for the handshake during connect and reconnect attempts.
    pub connect_timeout: Duration,
    /// Wait for the handshake when probing an address during setup
    /// (see [`probe_config`](crate::supervisor::probe_config)).
    pub probe_timeout: Duration,
    /// Pause after a successful connect so the initial state dump lands.
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(CoreError::Config {
                message: "switcher address is required".into(),
            });
        }
        if address.chars().any(char::is_whitespace) {
            return Err(CoreError::Config {
                message: format!("invalid switcher address: {address:?}"),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "connect timeout must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config {
                message: "retry.max_attempts must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            poll_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}
