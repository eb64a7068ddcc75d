//! State machine module for the assistant lifecycle
//!
//! Provides an explicit state machine with eight states:
//! - Idle: components not yet started
//! - ArmedForTrigger: listening for the trigger phrase
//! - CapturingCommand: recording the spoken command
//! - Dispatching: recognizing and executing the command
//! - Speaking: playing the response
//! - Cooldown: refractory period, detector paused
//! - Error: resetting components after a fault
//! - ShuttingDown: terminal

mod machine;
mod table;

pub use machine::{StateMachine, Subscriber, TransitionRecord, DEFAULT_HISTORY_LIMIT};
pub use table::AssistantState;
