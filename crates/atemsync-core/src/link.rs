//! Boundary to the device-client library that owns the switcher session.
//!
//! The wire protocol lives outside this crate. Anything that can open a
//! session, report whether it is up, read the mix-effect state and deliver
//! push notifications implements [`DeviceLink`].
//!
//! Every method except [`DeviceLink::is_connected`] may block on network
//! I/O, so the coordinator only calls them from
//! [`tokio::task::spawn_blocking`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error reported by the device-client library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LinkError {
    pub message: String,
}

impl LinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A push notification delivered by the switcher.
///
/// `command` is the four-character protocol command code (`"PrgI"`,
/// `"PrvI"`, `"Time"`, ...). `name` is the library's human-readable label
/// for it, when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub command: String,
    pub name: Option<String>,
}

impl DeviceEvent {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Callback invoked on the link's own delivery thread.
pub type EventCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Synchronous session with a single switcher.
pub trait DeviceLink: Send + Sync + 'static {
    /// Start a session. Returns `true` if the handshake already completed.
    fn connect(&self, address: &str) -> Result<bool, LinkError>;

    /// Close the session. Must be safe to call when already disconnected.
    fn disconnect(&self);

    /// Block until the session is up or `timeout` elapses.
    fn wait_for_connection(&self, timeout: Duration) -> bool;

    /// Current session flag. Must not block.
    fn is_connected(&self) -> bool;

    /// Register the push-event callback.
    fn register_event(&self, callback: EventCallback) -> Result<(), LinkError>;

    // ── Field reads (mix effect 1) ───────────────────────────────────

    fn program_input(&self) -> Result<u16, LinkError>;

    fn preview_input(&self) -> Result<u16, LinkError>;

    fn model_name(&self) -> Result<String, LinkError>;

    // ── Control primitives ───────────────────────────────────────────

    fn cut(&self) -> Result<(), LinkError>;

    fn auto_transition(&self) -> Result<(), LinkError>;

    fn set_program_input(&self, input: u16) -> Result<(), LinkError>;

    fn set_preview_input(&self, input: u16) -> Result<(), LinkError>;
}
