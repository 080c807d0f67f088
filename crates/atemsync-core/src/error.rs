// ── Core error types ──
//
// Errors surfaced by atemsync-core. Only setup, command and registry
// paths return these; steady-state connection loss is reflected in the
// published snapshot instead of being raised.

use thiserror::Error;

use crate::link::LinkError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach switcher at {address}: {reason}")]
    SetupUnreachable { address: String, reason: String },

    #[error("Switcher disconnected")]
    DeviceDisconnected,

    // ── Command errors ───────────────────────────────────────────────
    #[error("Unknown input '{input}' for model {model}")]
    InvalidCommandInput { input: String, model: String },

    #[error("Switcher rejected the operation: {0}")]
    Device(#[from] LinkError),

    // ── Registry errors ──────────────────────────────────────────────
    #[error("A coordinator for {address} is already configured")]
    AlreadyConfigured { address: String },

    #[error("No coordinator configured for {address}")]
    NotFound { address: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Internal(format!("device worker failed: {err}"))
    }
}
