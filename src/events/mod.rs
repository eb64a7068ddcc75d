//! Events module for assistant state changes and pipeline milestones
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel. A slow
//! receiver lags and skips events; senders never wait on it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::AssistantState;

/// Capacity of the default event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Events emitted by the state machine and the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// A transition was committed
    StateChanged {
        from: AssistantState,
        to: AssistantState,
        /// Time spent in `from`
        duration_ms: u64,
    },

    /// The detector reported a score at or above the threshold
    TriggerDetected { confidence: f32 },

    /// Capture window opened
    CaptureStarted,

    /// Capture window closed and its buffer handed off or dropped
    CaptureReleased {
        /// Number of frames held by the window
        frames: usize,
    },

    /// Recognizer produced text (empty when recognition failed)
    CommandRecognized { text: String },

    /// A command ran
    CommandExecuted {
        name: String,
        /// Whether the action succeeded
        success: bool,
    },

    /// No command matched the recognized text
    CommandNotMatched { text: String },

    /// Response playback finished or was skipped
    ResponseSpoken {
        text: String,
        /// False when synthesis failed and the response was skipped
        audible: bool,
    },

    /// The producer dropped frames because the channel was full
    FramesDropped { count: u64 },
}

impl std::fmt::Display for AssistantEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssistantEvent::StateChanged {
                from,
                to,
                duration_ms,
            } => write!(f, "STATE_CHANGED {} -> {} ({}ms)", from, to, duration_ms),
            AssistantEvent::TriggerDetected { confidence } => {
                write!(f, "TRIGGER_DETECTED ({:.2})", confidence)
            }
            AssistantEvent::CaptureStarted => write!(f, "CAPTURE_STARTED"),
            AssistantEvent::CaptureReleased { frames } => {
                write!(f, "CAPTURE_RELEASED ({} frames)", frames)
            }
            AssistantEvent::CommandRecognized { text } => {
                write!(f, "COMMAND_RECOGNIZED \"{}\"", text)
            }
            AssistantEvent::CommandExecuted { name, success } => {
                write!(f, "COMMAND_EXECUTED {} (success: {})", name, success)
            }
            AssistantEvent::CommandNotMatched { text } => {
                write!(f, "COMMAND_NOT_MATCHED \"{}\"", text)
            }
            AssistantEvent::ResponseSpoken { text, audible } => {
                write!(f, "RESPONSE_SPOKEN \"{}\" (audible: {})", text, audible)
            }
            AssistantEvent::FramesDropped { count } => write!(f, "FRAMES_DROPPED ({})", count),
        }
    }
}

/// Create the event channel shared by the state machine and orchestrator
pub fn channel() -> (
    broadcast::Sender<AssistantEvent>,
    broadcast::Receiver<AssistantEvent>,
) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
