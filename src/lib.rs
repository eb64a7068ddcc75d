//! wake-assistant: trigger-word activated voice command loop
//!
//! The assistant listens to a continuous audio stream for a trigger phrase,
//! records the spoken command that follows, resolves it against an ordered
//! command table and speaks the result:
//!
//! - `state`: the authoritative state machine and its transition table
//! - `detector`: per-frame trigger scoring, gated by pause/resume
//! - `commands`: the ordered command registry and the default command set
//! - `orchestrator`: the control loop tying audio, detection, speech and
//!   commands together
//!
//! Speech recognition, synthesis and the audio device sit behind traits;
//! `console` provides stdin/stdout stand-ins for all of them.

pub mod audio;
pub mod commands;
pub mod config;
pub mod console;
pub mod detector;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod speech;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{AssistantError, Result};
pub use orchestrator::{AssistantHandle, Components, Orchestrator};
pub use state::{AssistantState, StateMachine};
