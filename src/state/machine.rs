//! Core state machine implementation
//!
//! Every transition is validated against the static table and committed under
//! a single lock, so two callers racing from the same source state cannot
//! both succeed. Reads of the current state go through an atomic snapshot and
//! never wait on that lock.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::table::AssistantState;
use crate::error::{AssistantError, Result};
use crate::events::AssistantEvent;

/// Number of transition records kept by default
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Callback invoked when the machine enters a state
pub type Subscriber = Box<dyn Fn(&TransitionRecord) + Send + Sync>;

/// One committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: AssistantState,
    pub to: AssistantState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

struct Inner {
    history: VecDeque<TransitionRecord>,
    state_entered_at: Instant,
}

/// The authoritative record of assistant state
pub struct StateMachine {
    /// Snapshot of the committed state, written only under `commit`
    current: AtomicU8,
    /// Held for the whole check-commit-notify sequence
    commit: Mutex<()>,
    inner: Mutex<Inner>,
    history_limit: usize,
    subscribers: RwLock<HashMap<AssistantState, Vec<Subscriber>>>,
    /// Thread currently running subscribers, if any
    notifying: Mutex<Option<ThreadId>>,
    event_tx: broadcast::Sender<AssistantEvent>,
}

impl StateMachine {
    /// Create a new state machine in Idle
    pub fn new(event_tx: broadcast::Sender<AssistantEvent>) -> Self {
        Self::with_history_limit(event_tx, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(event_tx: broadcast::Sender<AssistantEvent>, limit: usize) -> Self {
        Self {
            current: AtomicU8::new(AssistantState::Idle.as_u8()),
            commit: Mutex::new(()),
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(limit.min(DEFAULT_HISTORY_LIMIT)),
                state_entered_at: Instant::now(),
            }),
            history_limit: limit.max(1),
            subscribers: RwLock::new(HashMap::new()),
            notifying: Mutex::new(None),
            event_tx,
        }
    }

    /// The last committed state
    pub fn current_state(&self) -> AssistantState {
        AssistantState::from_u8(self.current.load(Ordering::Acquire))
    }

    pub fn can_transition(&self, target: AssistantState) -> bool {
        self.current_state().can_transition_to(target)
    }

    /// How long the machine has been in the current state
    pub fn time_in_state(&self) -> Duration {
        lock(&self.inner).state_entered_at.elapsed()
    }

    /// Validate and commit a transition, then notify subscribers of `target`
    ///
    /// Subscribers run on the calling thread before this returns, in
    /// registration order.
    pub fn transition(
        &self,
        target: AssistantState,
        reason: impl Into<String>,
    ) -> Result<TransitionRecord> {
        if self.is_notifying_thread() {
            warn!(%target, "transition attempted from inside a state subscriber");
            return Err(AssistantError::Reentrant { target });
        }

        let _commit = lock(&self.commit);
        let from = self.current_state();

        if !from.can_transition_to(target) {
            warn!(from = %from, to = %target, "invalid state transition rejected");
            return Err(AssistantError::InvalidTransition { from, to: target });
        }

        let record = TransitionRecord {
            from,
            to: target,
            timestamp: Utc::now(),
            reason: reason.into(),
        };

        let duration_ms = {
            let mut inner = lock(&self.inner);
            let duration_ms = inner.state_entered_at.elapsed().as_millis() as u64;
            inner.state_entered_at = Instant::now();
            inner.history.push_front(record.clone());
            inner.history.truncate(self.history_limit);
            duration_ms
        };
        self.current.store(target.as_u8(), Ordering::Release);

        info!(
            from = %from,
            to = %target,
            duration_ms = duration_ms,
            reason = %record.reason,
            "state transition"
        );

        let _ = self.event_tx.send(AssistantEvent::StateChanged {
            from,
            to: target,
            duration_ms,
        });

        // Still holding `commit`: a concurrent transition cannot interleave
        // with this notification round.
        self.notify(&record);

        Ok(record)
    }

    /// Register a callback for every entry into `state`
    pub fn subscribe<F>(&self, state: AssistantState, callback: F) -> Result<()>
    where
        F: Fn(&TransitionRecord) + Send + Sync + 'static,
    {
        if self.is_notifying_thread() {
            return Err(AssistantError::Reentrant { target: state });
        }
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(state)
            .or_default()
            .push(Box::new(callback));
        debug!(%state, "state subscriber registered");
        Ok(())
    }

    /// Transition records, most recent first
    pub fn history(&self, limit: usize) -> Vec<TransitionRecord> {
        lock(&self.inner)
            .history
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    fn notify(&self, record: &TransitionRecord) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(callbacks) = subscribers.get(&record.to) else {
            return;
        };

        *lock(&self.notifying) = Some(thread::current().id());
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(record))).is_err() {
                error!(state = %record.to, "state subscriber panicked");
            }
        }
        *lock(&self.notifying) = None;
    }

    fn is_notifying_thread(&self) -> bool {
        *lock(&self.notifying) == Some(thread::current().id())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
