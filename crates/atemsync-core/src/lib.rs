// atemsync-core: Resilient program/preview state mirror for ATEM switchers.

pub mod bridge;
pub mod builder;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod model;
pub mod registry;
pub mod stream;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeStats, EventBridge, EventKind, RefreshTrigger};
pub use builder::SnapshotBuilder;
pub use command::Command;
pub use config::{RetryPolicy, SyncConfig};
pub use coordinator::{CoordinatorPhase, SyncCoordinator};
pub use error::CoreError;
pub use link::{DeviceEvent, DeviceLink, EventCallback, LinkError};
pub use registry::CoordinatorRegistry;
pub use stream::{SnapshotStream, SnapshotWatchStream};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, ProbeReport, ReconnectOutcome, RetryBudget, probe,
    probe_config,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    DEFAULT_PROFILE, Field, InputRef, InputSelector, Labelled, LinkStatus, MINI_EXTREME_ISO,
    ModelProfile, Snapshot, input_name, profile_for,
};
