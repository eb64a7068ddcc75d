//! Console backends
//!
//! Lets the loop run without acoustic models: the trigger phrase and the
//! command are typed on stdin, responses are printed, and the audio source
//! produces paced silent frames so capture windows close on silence.
//!
//! Typing the trigger phrase followed by a command on one line queues the
//! command for the recognizer.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::audio::{AudioFrame, AudioSource, FrameSink};
use crate::commands::normalize;
use crate::detector::WakeScorer;
use crate::error::{AssistantError, Result};
use crate::speech::{Recognizer, Synthesizer};

/// Lines typed on stdin, shared by the console scorer and recognizer
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<VecDeque<String>>>,
    arrived: Arc<Notify>,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl ConsoleInput {
    /// Start the stdin reader thread
    pub fn start() -> Result<Self> {
        let input = Self::detached();
        let reader = input.clone();

        thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                info!("console input thread started");
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => reader.push_line(&line),
                        Err(e) => {
                            warn!(error = %e, "console read failed");
                            break;
                        }
                    }
                }
                reader.close();
                info!("console input closed");
            })
            .map_err(|e| AssistantError::DeviceFailure {
                message: format!("failed to spawn console reader: {e}"),
            })?;

        Ok(input)
    }

    fn detached() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            arrived: Arc::new(Notify::new()),
            closed_tx: Arc::new(closed_tx),
        }
    }

    fn push_line(&self, line: &str) {
        let line = normalize(line);
        if line.is_empty() {
            return;
        }
        lock(&self.lines).push_back(line);
        self.arrived.notify_one();
    }

    fn close(&self) {
        self.closed_tx.send_replace(true);
        self.arrived.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Resolves once stdin reaches end of file
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn pop(&self) -> Option<String> {
        lock(&self.lines).pop_front()
    }

    async fn next_line(&self) -> Option<String> {
        loop {
            if let Some(line) = self.pop() {
                return Some(line);
            }
            if self.is_closed() {
                return None;
            }
            self.arrived.notified().await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scores 1.0 on the frame after a line containing the trigger phrase
///
/// Any other line typed while armed is discarded.
pub struct PhraseScorer {
    input: ConsoleInput,
    phrase: String,
}

impl PhraseScorer {
    pub fn new(input: ConsoleInput, phrase: &str) -> Self {
        Self {
            input,
            phrase: normalize(phrase),
        }
    }
}

impl WakeScorer for PhraseScorer {
    fn score(&mut self, _frame: &AudioFrame) -> f32 {
        let Some(line) = self.input.pop() else {
            return 0.0;
        };

        let padded = format!(" {line} ");
        let needle = format!(" {} ", self.phrase);
        match padded.find(&needle) {
            Some(at) => {
                let rest = padded[at + needle.len()..].trim();
                if !rest.is_empty() {
                    lock(&self.input.lines).push_front(rest.to_string());
                }
                1.0
            }
            None => {
                debug!(line = %line, "ignored input while waiting for the trigger phrase");
                0.0
            }
        }
    }

    fn reset(&mut self) {
        let stale = {
            let mut lines = lock(&self.input.lines);
            let stale = lines.len();
            lines.clear();
            stale
        };
        if stale > 0 {
            debug!(stale, "discarded input typed during cooldown");
        }
    }
}

/// Treats the next typed line as the recognized command
pub struct ConsoleRecognizer {
    input: ConsoleInput,
    language: String,
}

impl ConsoleRecognizer {
    pub fn new(input: ConsoleInput, language: impl Into<String>) -> Self {
        Self {
            input,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

#[async_trait]
impl Recognizer for ConsoleRecognizer {
    async fn recognize(&self, audio: &[i16]) -> Result<String> {
        debug!(language = %self.language, samples = audio.len(), "waiting for typed command");
        self.input
            .next_line()
            .await
            .ok_or_else(|| AssistantError::RecognitionFailed {
                message: "console input closed".to_string(),
            })
    }
}

/// Prints responses to stdout
///
/// Lines are prefixed with the voice name, or `assistant` for the default voice.
pub struct ConsoleSynthesizer {
    prefix: String,
}

impl ConsoleSynthesizer {
    pub fn new(voice: &str) -> Self {
        let voice = voice.trim();
        let prefix = if voice.is_empty() || voice.eq_ignore_ascii_case("default") {
            "assistant".to_string()
        } else {
            voice.to_string()
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for ConsoleSynthesizer {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl Synthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}> {text}", self.prefix)
            .and_then(|()| stdout.flush())
            .map_err(|e| AssistantError::SynthesisFailed {
                message: e.to_string(),
            })
    }

    fn stop(&self) {}
}

/// Emits silent frames at the configured frame rate
pub struct ConsoleAudioSource {
    frame_samples: usize,
    period: Duration,
    running: Option<Arc<AtomicBool>>,
}

impl ConsoleAudioSource {
    pub fn new(frame_samples: usize, period: Duration) -> Self {
        Self {
            frame_samples,
            period,
            running: None,
        }
    }
}

impl AudioSource for ConsoleAudioSource {
    fn stream(&mut self, sink: FrameSink) -> Result<()> {
        self.stop();

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let frame_samples = self.frame_samples;
        let period = self.period;

        thread::Builder::new()
            .name("console-audio".to_string())
            .spawn(move || {
                let mut seq = 0u64;
                while flag.load(Ordering::SeqCst) && !sink.is_closed() {
                    thread::sleep(period);
                    sink.push(AudioFrame::new(seq, vec![0; frame_samples]));
                    seq += 1;
                }
                debug!(frames = seq, "console audio thread stopped");
            })
            .map_err(|e| AssistantError::DeviceFailure {
                message: format!("failed to spawn audio thread: {e}"),
            })?;

        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }
    }

    fn is_streaming(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.load(Ordering::SeqCst))
    }
}
