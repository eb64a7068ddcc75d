//! The control loop
//!
//! One handler per non-terminal state. Each handler runs to completion and
//! returns the next state it wants; the loop commits that through the state
//! machine. Every wait inside a handler is raced against the shutdown signal,
//! and the waits in `CapturingCommand` and `Speaking` against cancel requests
//! too. While a handler waits, frames keep flowing through the (paused)
//! detector and are discarded there.

mod capture;
mod handle;

pub use capture::{CaptureEnd, CooldownTimer};
pub use handle::AssistantHandle;

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFrame, AudioSource, FrameSink, FrameStream};
use crate::commands::{CommandRegistry, Dispatch};
use crate::config::Config;
use crate::detector::{TriggerDetector, WakeScorer};
use crate::error::Result;
use crate::events::{self, AssistantEvent};
use crate::speech::{Recognizer, Synthesizer};
use crate::state::{AssistantState, StateMachine};

use capture::CaptureWindow;

/// External collaborators the orchestrator drives
pub struct Components {
    pub source: Box<dyn AudioSource>,
    pub scorer: Box<dyn WakeScorer>,
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// A handler's request for the next state
#[derive(Debug)]
struct Step {
    to: AssistantState,
    reason: String,
}

impl Step {
    fn new(to: AssistantState, reason: impl Into<String>) -> Self {
        Self {
            to,
            reason: reason.into(),
        }
    }
}

/// How a bounded wait ended
enum Wait<T> {
    Done(T),
    Cancelled,
    Shutdown,
}

pub struct Orchestrator {
    config: Config,
    machine: Arc<StateMachine>,
    detector: TriggerDetector,
    registry: CommandRegistry,
    source: Box<dyn AudioSource>,
    recognizer: Arc<dyn Recognizer>,
    synthesizer: Arc<dyn Synthesizer>,
    frames: Option<FrameStream>,
    shutdown_rx: watch::Receiver<bool>,
    cancel_rx: watch::Receiver<u64>,
    event_tx: broadcast::Sender<AssistantEvent>,
    capture: Option<CaptureWindow>,
    capture_active: Arc<AtomicBool>,
    pending_audio: Vec<i16>,
    pending_response: Option<String>,
    cooldown: Option<CooldownTimer>,
    consecutive_errors: u32,
    last_fault: Option<String>,
}

impl Orchestrator {
    /// Wire the components together; nothing starts until [`Orchestrator::run`]
    pub fn new(
        config: Config,
        components: Components,
        registry: CommandRegistry,
    ) -> (Self, AssistantHandle) {
        let (event_tx, _) = events::channel();
        let machine = Arc::new(StateMachine::new(event_tx.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        let capture_active = Arc::new(AtomicBool::new(false));

        let detector = TriggerDetector::new(
            components.scorer,
            config.trigger.threshold,
            config.trigger.rearm_discard_frames,
        );

        let handle = AssistantHandle::new(
            Arc::clone(&machine),
            shutdown_tx,
            cancel_tx,
            event_tx.clone(),
            Arc::clone(&capture_active),
        );

        let orchestrator = Self {
            config,
            machine,
            detector,
            registry,
            source: components.source,
            recognizer: components.recognizer,
            synthesizer: components.synthesizer,
            frames: None,
            shutdown_rx,
            cancel_rx,
            event_tx,
            capture: None,
            capture_active,
            pending_audio: Vec::new(),
            pending_response: None,
            cooldown: None,
            consecutive_errors: 0,
            last_fault: None,
        };

        (orchestrator, handle)
    }

    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    /// Drive the assistant until it reaches `ShuttingDown`
    pub async fn run(mut self) {
        info!(
            threshold = self.config.trigger.threshold,
            cooldown_secs = self.config.trigger.cooldown_secs,
            commands = self.registry.len(),
            "orchestrator started"
        );

        loop {
            let state = self.machine.current_state();
            let step = match state {
                AssistantState::Idle => self.on_idle().await,
                AssistantState::ArmedForTrigger => self.on_armed().await,
                AssistantState::CapturingCommand => self.on_capturing().await,
                AssistantState::Dispatching => self.on_dispatching().await,
                AssistantState::Speaking => self.on_speaking().await,
                AssistantState::Cooldown => self.on_cooldown().await,
                AssistantState::Error => self.on_error().await,
                AssistantState::ShuttingDown => break,
            };
            self.report_dropped();
            self.advance(step);
        }

        self.release_all();
        info!("orchestrator stopped");
    }

    /// Commit a handler's step, routing coordination faults to `Error`
    fn advance(&mut self, step: Step) {
        // Only cancels sent after the commit apply to the new state
        if step.to.is_cancellable() {
            self.cancel_rx.borrow_and_update();
        }
        let Err(e) = self.machine.transition(step.to, step.reason) else {
            return;
        };
        error!(error = %e, "orchestrator coordination fault");
        self.last_fault = Some(e.to_string());

        let fallback = if self.machine.can_transition(AssistantState::Error) {
            AssistantState::Error
        } else {
            AssistantState::ShuttingDown
        };
        if let Err(e) = self
            .machine
            .transition(fallback, format!("coordination fault: {e}"))
        {
            error!(error = %e, "could not route coordination fault");
        }
    }

    async fn on_idle(&mut self) -> Step {
        if let Err(e) = self.start_stream() {
            return self.fault(format!("failed to start audio stream: {e}"));
        }

        if let Some(greeting) = self.config.speech.startup_greeting.clone() {
            if let Wait::Shutdown = self.say(greeting, false).await {
                return Step::new(AssistantState::ShuttingDown, "shutdown during startup");
            }
        }

        Step::new(AssistantState::ArmedForTrigger, "components initialized")
    }

    async fn on_armed(&mut self) -> Step {
        if let Some(timer) = self.cooldown.take() {
            debug!(expired = timer.is_expired(Instant::now()), "cooldown cleared");
        }
        self.detector.resume();
        if let Some(frames) = self.frames.as_mut() {
            let stale = frames.drain();
            if stale > 0 {
                debug!(stale, "discarded queued frames before arming");
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    return Step::new(AssistantState::ShuttingDown, "shutdown requested");
                }
                frame = next_frame(&mut self.frames) => {
                    let Some(frame) = frame else {
                        return self.fault("audio stream closed while armed");
                    };
                    let result = self.detector.evaluate(&frame);
                    if result.triggered && self.machine.current_state().accepts_trigger() {
                        self.emit(AssistantEvent::TriggerDetected {
                            confidence: result.confidence,
                        });
                        return Step::new(
                            AssistantState::CapturingCommand,
                            format!("trigger detected (confidence {:.2})", result.confidence),
                        );
                    }
                }
            }
        }
    }

    async fn on_capturing(&mut self) -> Step {
        self.detector.pause();

        if let Some(prompt) = self.config.speech.acknowledgement.clone() {
            match self.say(prompt, true).await {
                Wait::Done(_) => {}
                Wait::Cancelled => {
                    return Step::new(AssistantState::Cooldown, "cancelled before capture")
                }
                Wait::Shutdown => {
                    return Step::new(AssistantState::ShuttingDown, "shutdown before capture")
                }
            }
            // Whatever was queued during the prompt is the prompt itself
            if let Some(frames) = self.frames.as_mut() {
                frames.drain();
            }
        }

        self.capture = Some(CaptureWindow::open(
            self.config.capture.speech_threshold,
            self.config.silence_timeout(),
            self.config.max_record_time(),
            Arc::clone(&self.capture_active),
            self.event_tx.clone(),
        ));

        loop {
            let Some(deadline) = self.capture.as_ref().map(CaptureWindow::deadline) else {
                return self.fault("capture window vanished");
            };

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    self.capture = None;
                    return Step::new(AssistantState::ShuttingDown, "shutdown during capture");
                }
                _ = cancel_requested(&mut self.cancel_rx) => {
                    self.capture = None;
                    return Step::new(AssistantState::Cooldown, "cancelled during capture");
                }
                _ = sleep_until(deadline) => {
                    let end = self.capture.as_ref().and_then(|w| w.end(Instant::now()));
                    if let Some(end) = end {
                        return self.finish_capture(end);
                    }
                }
                frame = next_frame(&mut self.frames) => {
                    let Some(frame) = frame else {
                        self.capture = None;
                        return self.fault("capture device failed");
                    };
                    self.detector.evaluate(&frame);
                    if let Some(window) = self.capture.as_mut() {
                        window.push(&frame, Instant::now());
                    }
                }
            }
        }
    }

    fn finish_capture(&mut self, end: CaptureEnd) -> Step {
        let Some(window) = self.capture.take() else {
            return self.fault("capture window vanished");
        };
        let heard_speech = window.heard_speech();
        self.pending_audio = window.into_audio();
        info!(
            ?end,
            heard_speech,
            samples = self.pending_audio.len(),
            "command capture finished"
        );
        let reason = match end {
            CaptureEnd::Silence => "silence timeout",
            CaptureEnd::MaxRecordTime => "max record time reached",
        };
        Step::new(AssistantState::Dispatching, reason)
    }

    async fn on_dispatching(&mut self) -> Step {
        let audio = std::mem::take(&mut self.pending_audio);
        let recognizer = Arc::clone(&self.recognizer);
        let limit = self.config.recognition_timeout();
        let work = async move { timeout(limit, recognizer.recognize(&audio)).await };

        let recognized = match self.wait_discarding(work, false).await {
            Wait::Done(Ok(Ok(text))) if !text.trim().is_empty() => Some(text),
            Wait::Done(Ok(Ok(_))) => {
                warn!("recognizer returned no text");
                None
            }
            Wait::Done(Ok(Err(e))) => {
                warn!(error = %e, "recognition failed, treating as no match");
                None
            }
            Wait::Done(Err(_)) => {
                warn!(?limit, "recognition timed out, treating as no match");
                None
            }
            Wait::Cancelled | Wait::Shutdown => {
                return Step::new(AssistantState::ShuttingDown, "shutdown during recognition");
            }
        };

        let (response, reason) = match recognized {
            None => {
                self.emit(AssistantEvent::CommandRecognized {
                    text: String::new(),
                });
                (self.config.speech.fallback_response.clone(), "nothing recognized")
            }
            Some(text) => {
                info!(text = %text, "command recognized");
                self.emit(AssistantEvent::CommandRecognized { text: text.clone() });
                self.respond_to(&text)
            }
        };

        self.pending_response = Some(response);
        Step::new(AssistantState::Speaking, reason)
    }

    /// Run the registry and turn every outcome into something to say
    fn respond_to(&mut self, text: &str) -> (String, &'static str) {
        match self.registry.dispatch(text) {
            Dispatch::Executed { command, response } => {
                self.emit(AssistantEvent::CommandExecuted {
                    name: command,
                    success: true,
                });
                if response.trim().is_empty() {
                    ("Done.".to_string(), "command executed")
                } else {
                    (response, "command executed")
                }
            }
            Dispatch::Failed { command, cause } => {
                warn!(command = %command, cause = %cause, "command failed");
                self.emit(AssistantEvent::CommandExecuted {
                    name: command,
                    success: false,
                });
                (self.config.speech.failure_response.clone(), "command failed")
            }
            Dispatch::NoMatch => {
                info!(text = %text, "no command matched");
                self.emit(AssistantEvent::CommandNotMatched {
                    text: text.to_string(),
                });
                (self.config.speech.fallback_response.clone(), "no command matched")
            }
        }
    }

    async fn on_speaking(&mut self) -> Step {
        let text = self
            .pending_response
            .take()
            .unwrap_or_else(|| self.config.speech.fallback_response.clone());

        match self.say(text, true).await {
            Wait::Done(true) => Step::new(AssistantState::Cooldown, "response spoken"),
            Wait::Done(false) => Step::new(AssistantState::Cooldown, "response skipped"),
            Wait::Cancelled => Step::new(AssistantState::Cooldown, "cancelled during playback"),
            Wait::Shutdown => Step::new(AssistantState::ShuttingDown, "shutdown during playback"),
        }
    }

    async fn on_cooldown(&mut self) -> Step {
        self.consecutive_errors = 0;
        self.detector.pause();
        let timer = CooldownTimer::start(self.config.cooldown());
        self.cooldown = Some(timer);
        debug!(duration = ?timer.duration, "cooldown started");

        match self
            .wait_discarding(sleep_until(timer.deadline()), false)
            .await
        {
            Wait::Shutdown => {
                debug!(remaining = ?timer.remaining(Instant::now()), "cooldown cut short");
                Step::new(AssistantState::ShuttingDown, "shutdown during cooldown")
            }
            _ => Step::new(AssistantState::ArmedForTrigger, "cooldown elapsed"),
        }
    }

    async fn on_error(&mut self) -> Step {
        self.capture = None;
        self.pending_audio.clear();
        self.pending_response = None;
        let ceiling = self.config.recovery.max_error_retries;

        loop {
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
            let fault = self
                .last_fault
                .take()
                .unwrap_or_else(|| "unknown fault".to_string());
            error!(
                fault = %fault,
                attempt = self.consecutive_errors,
                ceiling,
                "recovering from fault"
            );

            if self.consecutive_errors > ceiling {
                return Step::new(
                    AssistantState::ShuttingDown,
                    format!("giving up after {} consecutive faults: {fault}", ceiling),
                );
            }

            let backoff = self.config.retry_backoff().saturating_mul(self.consecutive_errors);
            if let Wait::Shutdown = self.wait_discarding(sleep(backoff), false).await {
                return Step::new(AssistantState::ShuttingDown, "shutdown during recovery");
            }

            self.source.stop();
            self.frames = None;
            self.detector.reset();
            match self.start_stream() {
                Ok(()) => {
                    info!("components reset");
                    return Step::new(AssistantState::ArmedForTrigger, "components reset");
                }
                Err(e) => {
                    self.last_fault = Some(format!("reset failed: {e}"));
                }
            }
        }
    }

    /// Speak `text`, bounded by the speak timeout
    ///
    /// Resolves to whether the text was audible. Synthesis failures degrade
    /// to a logged, silent skip; an interrupted playback is stopped.
    async fn say(&mut self, text: String, cancellable: bool) -> Wait<bool> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let limit = self.config.speak_timeout();
        let spoken = text.clone();
        let work = async move { timeout(limit, synthesizer.speak(&spoken)).await };

        let audible = match self.wait_discarding(work, cancellable).await {
            Wait::Done(Ok(Ok(()))) => true,
            Wait::Done(Ok(Err(e))) => {
                warn!(error = %e, response = %text, "synthesis failed, response not spoken");
                false
            }
            Wait::Done(Err(_)) => {
                self.synthesizer.stop();
                warn!(?limit, response = %text, "synthesis timed out");
                false
            }
            Wait::Cancelled => {
                self.synthesizer.stop();
                return Wait::Cancelled;
            }
            Wait::Shutdown => {
                self.synthesizer.stop();
                return Wait::Shutdown;
            }
        };

        self.emit(AssistantEvent::ResponseSpoken { text, audible });
        Wait::Done(audible)
    }

    /// Await `work` while the paused detector keeps discarding frames
    async fn wait_discarding<F>(&mut self, work: F, cancellable: bool) -> Wait<F::Output>
    where
        F: Future,
    {
        tokio::pin!(work);
        let mut stream_open = self.frames.is_some();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => return Wait::Shutdown,
                _ = cancel_requested(&mut self.cancel_rx), if cancellable => return Wait::Cancelled,
                out = &mut work => return Wait::Done(out),
                frame = next_frame(&mut self.frames), if stream_open => match frame {
                    Some(frame) => {
                        self.detector.evaluate(&frame);
                    }
                    None => stream_open = false,
                },
            }
        }
    }

    fn start_stream(&mut self) -> Result<()> {
        let (sink, stream) = FrameSink::channel(self.config.audio.frame_buffer);
        self.source.stream(sink)?;
        self.frames = Some(stream);
        info!(
            sample_rate = self.config.audio.sample_rate,
            frame_samples = self.config.audio.frame_samples,
            "audio stream started"
        );
        Ok(())
    }

    fn release_all(&mut self) {
        self.capture = None;
        self.pending_audio.clear();
        self.pending_response = None;
        self.cooldown = None;
        self.synthesizer.stop();
        self.source.stop();
        self.frames = None;
        self.detector.pause();
        info!("components released");
    }

    fn fault(&mut self, message: impl Into<String>) -> Step {
        let message = message.into();
        warn!(fault = %message, "component fault");
        self.last_fault = Some(message.clone());
        Step::new(AssistantState::Error, message)
    }

    fn report_dropped(&mut self) {
        let Some(frames) = self.frames.as_ref() else {
            return;
        };
        let count = frames.take_dropped();
        if count > 0 {
            debug!(count, "frames dropped while the orchestrator was busy");
            self.emit(AssistantEvent::FramesDropped { count });
        }
    }

    fn emit(&self, event: AssistantEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn next_frame(frames: &mut Option<FrameStream>) -> Option<AudioFrame> {
    match frames {
        Some(frames) => frames.recv().await,
        None => None,
    }
}

/// Resolves once shutdown is requested or every handle is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Resolves on the next cancel request; never if the handles are gone
async fn cancel_requested(rx: &mut watch::Receiver<u64>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}
