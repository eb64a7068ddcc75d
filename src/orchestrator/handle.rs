//! Control surface for a running orchestrator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::events::AssistantEvent;
use crate::state::{AssistantState, StateMachine};

/// Cloneable handle to a running assistant
///
/// Dropping every handle is treated as a shutdown request.
#[derive(Clone)]
pub struct AssistantHandle {
    machine: Arc<StateMachine>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    cancel_tx: Arc<watch::Sender<u64>>,
    event_tx: broadcast::Sender<AssistantEvent>,
    capture_active: Arc<AtomicBool>,
}

impl AssistantHandle {
    pub(super) fn new(
        machine: Arc<StateMachine>,
        shutdown_tx: watch::Sender<bool>,
        cancel_tx: watch::Sender<u64>,
        event_tx: broadcast::Sender<AssistantEvent>,
        capture_active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            machine,
            shutdown_tx: Arc::new(shutdown_tx),
            cancel_tx: Arc::new(cancel_tx),
            event_tx,
            capture_active,
        }
    }

    /// Ask the orchestrator to release everything and stop
    ///
    /// Honored from any state; in-flight waits are abandoned.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!(state = %self.machine.current_state(), "shutdown requested");
        }
    }

    /// Abort the current capture or playback and go to cooldown
    ///
    /// Ignored outside `CapturingCommand` and `Speaking`.
    pub fn cancel(&self) -> bool {
        let state = self.machine.current_state();
        if !state.is_cancellable() {
            return false;
        }
        self.cancel_tx.send_modify(|generation| *generation += 1);
        info!(%state, in_state = ?self.machine.time_in_state(), "cancel requested");
        true
    }

    pub fn state(&self) -> AssistantState {
        self.machine.current_state()
    }

    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AssistantEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a command capture currently holds the input
    pub fn capture_active(&self) -> bool {
        self.capture_active.load(Ordering::SeqCst)
    }
}
