// ── Snapshot construction ──
//
// Reads the mix-effect fields from the link in one pass. Every read is
// isolated: a failing field becomes `Field::Unknown` and the rest of the
// pass continues. `build` is total and runs on the blocking pool.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::link::{DeviceLink, LinkError};
use crate::model::{DEFAULT_PROFILE, Field, InputRef, LinkStatus, Snapshot, profile_for};

/// Builds [`Snapshot`]s from the current state of a [`DeviceLink`].
#[derive(Clone)]
pub struct SnapshotBuilder {
    link: Arc<dyn DeviceLink>,
}

impl SnapshotBuilder {
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Self { link }
    }

    /// Read program, preview and model in a single pass.
    pub fn build(&self) -> Snapshot {
        if !self.link.is_connected() {
            debug!("link down, building disconnected snapshot");
            return Snapshot::disconnected();
        }

        let model = read_field("model", self.link.model_name());
        let profile = model
            .value()
            .map_or(&DEFAULT_PROFILE, |name| profile_for(name));

        let label = |id: u16| InputRef {
            id,
            name: profile.input_name(id),
        };

        let program = read_field("program", self.link.program_input().map(label));
        let preview = read_field("preview", self.link.preview_input().map(label));

        debug!(
            program = program.label(),
            preview = preview.label(),
            model = model.label(),
            "snapshot built"
        );

        Snapshot {
            program,
            preview,
            model,
            connection: LinkStatus::Connected,
            captured_at: Utc::now(),
        }
    }
}

fn read_field<T>(field: &'static str, result: Result<T, LinkError>) -> Field<T> {
    match result {
        Ok(value) => Field::Value { value },
        Err(e) => {
            warn!(field, error = %e, "field read failed");
            Field::Unknown { reason: e.message }
        }
    }
}
