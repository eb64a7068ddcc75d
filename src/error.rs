//! Error types for wake-assistant.

use thiserror::Error;

use crate::state::AssistantState;

#[derive(Error, Debug)]
pub enum AssistantError {
    // Coordination errors
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: AssistantState,
        to: AssistantState,
    },

    #[error("re-entrant transition to {target} attempted from a state subscriber")]
    Reentrant { target: AssistantState },

    // Device errors
    #[error("audio device failure: {message}")]
    DeviceFailure { message: String },

    // Speech engine errors
    #[error("speech recognition failed: {message}")]
    RecognitionFailed { message: String },

    #[error("speech synthesis failed: {message}")]
    SynthesisFailed { message: String },

    // Command errors
    #[error("command '{name}' failed: {cause}")]
    ActionFailed { name: String, cause: String },

    #[error("a command named '{name}' is already registered")]
    DuplicateName { name: String },

    // Configuration errors
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let error = AssistantError::InvalidTransition {
            from: AssistantState::Cooldown,
            to: AssistantState::CapturingCommand,
        };
        assert_eq!(
            error.to_string(),
            "invalid state transition: Cooldown -> CapturingCommand"
        );
    }

    #[test]
    fn test_action_failed_display() {
        let error = AssistantError::ActionFailed {
            name: "calculator".to_string(),
            cause: "program not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "command 'calculator' failed: program not found"
        );
    }
}
