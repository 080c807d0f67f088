// ── Command API ──
//
// Switcher control operations flow through a unified `Command` enum.
// The coordinator resolves input labels against the reported model,
// invokes the matching link primitive and queues a refresh.

use std::fmt;

use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::model::InputSelector;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<(), CoreError>>,
}

/// Control operations on the switcher's first mix-effect bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hard cut: swap program and preview.
    Cut,
    /// Run the configured transition.
    AutoTransition,
    SetProgramInput { input: InputSelector },
    SetPreviewInput { input: InputSelector },
}

impl Command {
    pub fn program(input: impl Into<InputSelector>) -> Self {
        Self::SetProgramInput {
            input: input.into(),
        }
    }

    pub fn preview(input: impl Into<InputSelector>) -> Self {
        Self::SetPreviewInput {
            input: input.into(),
        }
    }

    /// The input this command targets, if any.
    pub fn input(&self) -> Option<&InputSelector> {
        match self {
            Self::SetProgramInput { input } | Self::SetPreviewInput { input } => Some(input),
            Self::Cut | Self::AutoTransition => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cut => f.write_str("cut"),
            Self::AutoTransition => f.write_str("auto"),
            Self::SetProgramInput { input } => write!(f, "program={input}"),
            Self::SetPreviewInput { input } => write!(f, "preview={input}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_accept_ids_and_selectors() {
        assert_eq!(
            Command::program(3u16),
            Command::SetProgramInput {
                input: InputSelector::ById(3)
            }
        );
        let by_name = Command::preview(InputSelector::ByName("color1".into()));
        assert_eq!(
            by_name.input(),
            Some(&InputSelector::ByName("color1".into()))
        );
        assert_eq!(Command::Cut.input(), None);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Command::AutoTransition.to_string(), "auto");
        assert_eq!(Command::program(2001u16).to_string(), "program=2001");
    }
}
