// ── Static model → input-name tables ──
//
// Per-model input labels and capabilities. Lookup matches the table key
// case-insensitively anywhere inside the model string the switcher reports,
// falling back to the default profile for unrecognised hardware.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;

/// Static description of one switcher model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    pub inputs: &'static [(u16, &'static str)],
    pub max_inputs: u8,
    pub has_streaming: bool,
    pub has_recording: bool,
    pub has_multiview: bool,
    pub has_iso_recording: bool,
    pub has_advanced_chroma: bool,
}

impl ModelProfile {
    /// Label for `id`, if this model names it.
    pub fn input_label(&self, id: u16) -> Option<&'static str> {
        self.inputs
            .iter()
            .find(|(input, _)| *input == id)
            .map(|(_, label)| *label)
    }

    /// Reverse lookup, case-insensitive.
    pub fn input_id(&self, label: &str) -> Option<u16> {
        self.inputs
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(label))
            .map(|(id, _)| *id)
    }

    /// Display name for `id`, `"Input <id>"` when unmapped.
    pub fn input_name(&self, id: u16) -> String {
        self.input_label(id)
            .map_or_else(|| format!("Input {id}"), str::to_owned)
    }
}

pub const MINI_EXTREME_ISO: ModelProfile = ModelProfile {
    name: "ATEM Mini Extreme ISO",
    inputs: &[
        (1, "input1"),
        (2, "input2"),
        (3, "input3"),
        (4, "input4"),
        (5, "input5"),
        (6, "input6"),
        (7, "input7"),
        (8, "input8"),
        (2001, "color1"),
        (2002, "color2"),
        (3010, "mediaPlayer1"),
        (3020, "mediaPlayer2"),
        (6000, "superSource"),
        (0, "black"),
    ],
    max_inputs: 8,
    has_streaming: true,
    has_recording: true,
    has_multiview: true,
    has_iso_recording: true,
    has_advanced_chroma: true,
};

pub const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    name: "DEFAULT",
    inputs: &[
        (1, "input1"),
        (2, "input2"),
        (3, "input3"),
        (4, "input4"),
        (5, "input5"),
        (6, "input6"),
        (7, "input7"),
        (8, "input8"),
        (2001, "color1"),
        (2002, "color2"),
        (3010, "mediaPlayer1"),
        (3020, "mediaPlayer2"),
        (10010, "Program"),
        (10011, "Preview"),
        (0, "black"),
    ],
    max_inputs: 8,
    has_streaming: false,
    has_recording: false,
    has_multiview: false,
    has_iso_recording: false,
    has_advanced_chroma: false,
};

const KNOWN_MODELS: &[&ModelProfile] = &[&MINI_EXTREME_ISO];

/// Resolve the profile for a reported model name.
pub fn profile_for(model: &str) -> &'static ModelProfile {
    let reported = model.to_ascii_lowercase();
    KNOWN_MODELS
        .iter()
        .copied()
        .find(|profile| reported.contains(&profile.name.to_ascii_lowercase()))
        .unwrap_or(&DEFAULT_PROFILE)
}

/// Display name of `id` on `model`.
pub fn input_name(model: &str, id: u16) -> String {
    profile_for(model).input_name(id)
}

// ── InputSelector ────────────────────────────────────────────────────

/// A command input given either as a numeric source id or a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelector {
    ById(u16),
    ByName(String),
}

impl InputSelector {
    /// Resolve to a numeric source id using `model`'s table.
    ///
    /// Ids pass through untouched; the switcher is the authority on which
    /// sources exist.
    pub fn resolve(&self, model: &str) -> Result<u16, CoreError> {
        match self {
            Self::ById(id) => Ok(*id),
            Self::ByName(name) => {
                profile_for(model)
                    .input_id(name)
                    .ok_or_else(|| CoreError::InvalidCommandInput {
                        input: name.clone(),
                        model: model.to_owned(),
                    })
            }
        }
    }
}

impl FromStr for InputSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(trimmed
            .parse::<u16>()
            .map_or_else(|_| Self::ByName(trimmed.to_owned()), Self::ById))
    }
}

impl From<u16> for InputSelector {
    fn from(id: u16) -> Self {
        Self::ById(id)
    }
}

impl fmt::Display for InputSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "{id}"),
            Self::ByName(name) => f.write_str(name),
        }
    }
}
