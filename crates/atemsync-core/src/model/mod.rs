// ── Domain model ──
//
// Snapshot types published to consumers and the static per-model input
// tables used to label them.

pub mod inputs;
pub mod snapshot;

pub use inputs::{
    DEFAULT_PROFILE, InputSelector, MINI_EXTREME_ISO, ModelProfile, input_name, profile_for,
};
pub use snapshot::{Field, InputRef, Labelled, LinkStatus, Snapshot};
