//! Assistant states and the static transition table

use serde::{Deserialize, Serialize};

/// The possible states of the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssistantState {
    /// Components not started yet
    #[default]
    Idle,
    /// Detector running, waiting for the trigger phrase
    ArmedForTrigger,
    /// Recording the spoken command
    CapturingCommand,
    /// Recognizing the capture and running the matched command
    Dispatching,
    /// Playing the response
    Speaking,
    /// Refractory period after speaking, detector paused
    Cooldown,
    /// Recovering from a component fault
    Error,
    /// Releasing resources, terminal
    ShuttingDown,
}

impl AssistantState {
    pub const ALL: [AssistantState; 8] = [
        AssistantState::Idle,
        AssistantState::ArmedForTrigger,
        AssistantState::CapturingCommand,
        AssistantState::Dispatching,
        AssistantState::Speaking,
        AssistantState::Cooldown,
        AssistantState::Error,
        AssistantState::ShuttingDown,
    ];

    /// Legal successor states
    pub fn successors(self) -> &'static [AssistantState] {
        use AssistantState::*;
        match self {
            Idle => &[ArmedForTrigger, Error, ShuttingDown],
            ArmedForTrigger => &[CapturingCommand, Error, ShuttingDown],
            CapturingCommand => &[Dispatching, Cooldown, Error, ShuttingDown],
            Dispatching => &[Speaking, Error, ShuttingDown],
            Speaking => &[Cooldown, Error, ShuttingDown],
            Cooldown => &[ArmedForTrigger, Error, ShuttingDown],
            Error => &[ArmedForTrigger, ShuttingDown],
            ShuttingDown => &[],
        }
    }

    pub fn can_transition_to(self, target: AssistantState) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Whether the trigger detector may contribute detections in this state
    pub fn accepts_trigger(self) -> bool {
        self == AssistantState::ArmedForTrigger
    }

    /// Whether an external cancel request applies to this state
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            AssistantState::CapturingCommand | AssistantState::Speaking
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(AssistantState::Error)
    }
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssistantState::Idle => "Idle",
            AssistantState::ArmedForTrigger => "ArmedForTrigger",
            AssistantState::CapturingCommand => "CapturingCommand",
            AssistantState::Dispatching => "Dispatching",
            AssistantState::Speaking => "Speaking",
            AssistantState::Cooldown => "Cooldown",
            AssistantState::Error => "Error",
            AssistantState::ShuttingDown => "ShuttingDown",
        };
        f.write_str(name)
    }
}
