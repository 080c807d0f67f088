// ── Published switcher state ──
//
// One immutable view of the mix effect, produced per refresh and replaced
// wholesale by the next one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

/// A video source as the switcher reports it plus its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputRef {
    pub id: u16,
    pub name: String,
}

/// Outcome of reading one field during a snapshot pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Field<T> {
    Value { value: T },
    /// The read failed; other fields of the same pass are still valid.
    Unknown { reason: String },
    /// No session was up when the pass ran.
    Disconnected,
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value { value } => Some(value),
            Self::Unknown { .. } | Self::Disconnected => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Value { .. })
    }

    /// Short label for sensor-style consumers.
    pub fn label(&self) -> &str
    where
        T: Labelled,
    {
        match self {
            Self::Value { value } => value.label(),
            Self::Unknown { .. } => "Unknown",
            Self::Disconnected => "Disconnected",
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Self::Value { value }
    }
}

/// Values that render as a single label.
pub trait Labelled {
    fn label(&self) -> &str;
}

impl Labelled for InputRef {
    fn label(&self) -> &str {
        &self.name
    }
}

impl Labelled for String {
    fn label(&self) -> &str {
        self
    }
}

/// Link health observed when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    /// The read pass itself could not run.
    Error,
}

/// Point-in-time view of the switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub program: Field<InputRef>,
    pub preview: Field<InputRef>,
    pub model: Field<String>,
    pub connection: LinkStatus,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Sentinel published while the link is down.
    pub fn disconnected() -> Self {
        Self {
            program: Field::Disconnected,
            preview: Field::Disconnected,
            model: Field::Disconnected,
            connection: LinkStatus::Disconnected,
            captured_at: Utc::now(),
        }
    }

    /// Sentinel published when the read worker failed outright.
    pub fn error(reason: &str) -> Self {
        Self {
            program: Field::Unknown {
                reason: reason.to_owned(),
            },
            preview: Field::Unknown {
                reason: reason.to_owned(),
            },
            model: Field::Unknown {
                reason: reason.to_owned(),
            },
            connection: LinkStatus::Error,
            captured_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == LinkStatus::Connected
    }

    pub fn program_id(&self) -> Option<u16> {
        self.program.value().map(|input| input.id)
    }

    pub fn preview_id(&self) -> Option<u16> {
        self.preview.value().map(|input| input.id)
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.value().map(String::as_str)
    }

    /// Same device state, ignoring capture time.
    pub fn same_state(&self, other: &Self) -> bool {
        self.program == other.program
            && self.preview == other.preview
            && self.model == other.model
            && self.connection == other.connection
    }
}
