//! Scripted components for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::audio::{AudioFrame, AudioSource, FrameSink};
use crate::detector::WakeScorer;
use crate::error::{AssistantError, Result};
use crate::speech::{Recognizer, Synthesizer};

/// Wake scorer that replays scores by call order, then returns 0.0
pub struct ScriptedScorer {
    scores: Vec<f32>,
    repeat: Option<f32>,
    counts: ScorerCounts,
}

#[derive(Clone, Default)]
pub struct ScorerCounts {
    scored: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
}

impl ScorerCounts {
    pub fn scored(&self) -> usize {
        self.scored.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl ScriptedScorer {
    pub fn constant(score: f32) -> (Self, ScorerCounts) {
        let counts = ScorerCounts::default();
        let scorer = Self {
            scores: Vec::new(),
            repeat: Some(score),
            counts: counts.clone(),
        };
        (scorer, counts)
    }

    pub fn sequence(scores: impl IntoIterator<Item = f32>) -> (Self, ScorerCounts) {
        let counts = ScorerCounts::default();
        let scorer = Self {
            scores: scores.into_iter().collect(),
            repeat: None,
            counts: counts.clone(),
        };
        (scorer, counts)
    }
}

impl WakeScorer for ScriptedScorer {
    fn score(&mut self, _frame: &AudioFrame) -> f32 {
        let call = self.counts.scored.fetch_add(1, Ordering::SeqCst);
        match self.repeat {
            Some(score) => score,
            None => self.scores.get(call).copied().unwrap_or(0.0),
        }
    }

    fn reset(&mut self) {
        self.counts.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recognizer answering from a queue, then with empty text
#[derive(Clone, Default)]
pub struct MockRecognizer {
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockRecognizer {
    pub fn replying<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let recognizer = Self::default();
        for text in texts {
            recognizer.push(Ok(text.into()));
        }
        recognizer
    }

    pub fn failing() -> Self {
        let recognizer = Self::default();
        recognizer.push(Err(AssistantError::RecognitionFailed {
            message: "unintelligible".to_string(),
        }));
        recognizer
    }

    /// Each recognition takes `delay` of (tokio) time before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Result<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, _audio: &[i16]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Clone, Default)]
pub struct MockSynthesizer {
    spoken: Arc<Mutex<Vec<String>>>,
    fail: bool,
    delay: Option<Duration>,
    stops: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every utterance takes `delay` of (tokio) time to play
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(AssistantError::SynthesisFailed {
                message: "no output device".to_string(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audio source that emits frames of one constant sample on a tokio interval
pub struct ScriptedSource {
    period: Duration,
    frame_samples: usize,
    sample: i16,
    fail_starts: usize,
    close_first_after: Option<u64>,
    task: Option<JoinHandle<()>>,
    counts: SourceCounts,
}

#[derive(Clone, Default)]
pub struct SourceCounts {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    streaming: Arc<AtomicBool>,
}

impl SourceCounts {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(80),
            frame_samples: 160,
            sample: 0,
            fail_starts: 0,
            close_first_after: None,
            task: None,
            counts: SourceCounts::default(),
        }
    }

    pub fn counts(&self) -> SourceCounts {
        self.counts.clone()
    }

    /// Every frame carries speech-level energy
    pub fn loud(mut self) -> Self {
        self.sample = 8000;
        self
    }

    /// Refuse the first `count` calls to `stream`
    pub fn fail_starts(mut self, count: usize) -> Self {
        self.fail_starts = count;
        self
    }

    /// The first stream dies after `frames` frames
    pub fn close_first_after(mut self, frames: u64) -> Self {
        self.close_first_after = Some(frames);
        self
    }
}

impl AudioSource for ScriptedSource {
    fn stream(&mut self, sink: FrameSink) -> Result<()> {
        let attempt = self.counts.starts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_starts {
            return Err(AssistantError::DeviceFailure {
                message: "microphone unavailable".to_string(),
            });
        }

        let limit = if attempt == self.fail_starts {
            self.close_first_after
        } else {
            None
        };
        let period = self.period;
        let frame_samples = self.frame_samples;
        let sample = self.sample;
        self.counts.streaming.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut seq = 0u64;
            loop {
                ticker.tick().await;
                if limit.is_some_and(|limit| seq >= limit) || sink.is_closed() {
                    break;
                }
                sink.push(AudioFrame::new(seq, vec![sample; frame_samples]));
                seq += 1;
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.counts.streaming.store(false, Ordering::SeqCst);
        self.counts.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_streaming(&self) -> bool {
        self.counts.streaming()
    }
}

#[test]
fn test_mock_synthesizer_records() {
    let synthesizer = MockSynthesizer::new();
    tokio_test::block_on(synthesizer.speak("hello")).unwrap();
    assert_eq!(synthesizer.spoken(), vec!["hello".to_string()]);

    let failing = MockSynthesizer::failing();
    assert!(tokio_test::block_on(failing.speak("hello")).is_err());
}

#[test]
fn test_mock_recognizer_drains_queue() {
    let recognizer = MockRecognizer::replying(["first"]);
    assert_eq!(tokio_test::block_on(recognizer.recognize(&[])).unwrap(), "first");
    assert_eq!(tokio_test::block_on(recognizer.recognize(&[])).unwrap(), "");
    assert_eq!(recognizer.calls(), 2);
}
