//! Capture window and cooldown timer owned by the orchestrator

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::audio::{AudioFrame, SpeechGate};
use crate::events::AssistantEvent;

/// Why a capture window closed on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Silence,
    MaxRecordTime,
}

/// The in-flight command recording
///
/// Holding a window marks the capture resource as acquired; dropping it,
/// on any path, releases it and reports how many frames it held.
pub(crate) struct CaptureWindow {
    samples: Vec<i16>,
    frames: usize,
    gate: SpeechGate,
    opened_at: Instant,
    max_record: Duration,
    silence_timeout: Duration,
    active: Arc<AtomicBool>,
    event_tx: broadcast::Sender<AssistantEvent>,
}

impl CaptureWindow {
    pub(crate) fn open(
        speech_threshold: f32,
        silence_timeout: Duration,
        max_record: Duration,
        active: Arc<AtomicBool>,
        event_tx: broadcast::Sender<AssistantEvent>,
    ) -> Self {
        let now = Instant::now();
        active.store(true, Ordering::SeqCst);
        let _ = event_tx.send(AssistantEvent::CaptureStarted);
        debug!(?silence_timeout, ?max_record, "capture window opened");
        Self {
            samples: Vec::new(),
            frames: 0,
            gate: SpeechGate::new(speech_threshold, now),
            opened_at: now,
            max_record,
            silence_timeout,
            active,
            event_tx,
        }
    }

    pub(crate) fn push(&mut self, frame: &AudioFrame, now: Instant) {
        self.gate.observe(frame.level(), now);
        self.samples.extend_from_slice(&frame.samples);
        self.frames += 1;
    }

    /// Earliest instant at which the window could close on its own
    pub(crate) fn deadline(&self) -> Instant {
        let hard = self.opened_at + self.max_record;
        let silence = self.gate.last_speech_at() + self.silence_timeout;
        hard.min(silence)
    }

    pub(crate) fn end(&self, now: Instant) -> Option<CaptureEnd> {
        if now.saturating_duration_since(self.opened_at) >= self.max_record {
            Some(CaptureEnd::MaxRecordTime)
        } else if self.gate.silence(now) >= self.silence_timeout {
            Some(CaptureEnd::Silence)
        } else {
            None
        }
    }

    pub(crate) fn heard_speech(&self) -> bool {
        self.gate.heard_speech()
    }

    /// Hand the recorded samples off, releasing the window
    pub(crate) fn into_audio(mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }
}

impl Drop for CaptureWindow {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(AssistantEvent::CaptureReleased {
            frames: self.frames,
        });
        debug!(frames = self.frames, "capture window released");
    }
}

/// Refractory period after a response
#[derive(Debug, Clone, Copy)]
pub struct CooldownTimer {
    pub armed_at: Instant,
    pub duration: Duration,
}

impl CooldownTimer {
    pub fn start(duration: Duration) -> Self {
        Self {
            armed_at: Instant::now(),
            duration,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.armed_at + self.duration
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(active: &Arc<AtomicBool>) -> (CaptureWindow, broadcast::Receiver<AssistantEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let window = CaptureWindow::open(
            0.02,
            Duration::from_secs(2),
            Duration::from_secs(30),
            Arc::clone(active),
            tx,
        );
        (window, rx)
    }

    fn loud(seq: u64) -> AudioFrame {
        AudioFrame::new(seq, vec![8000; 160])
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_on_silence_after_open() {
        let active = Arc::new(AtomicBool::new(false));
        let (window, _rx) = window(&active);
        assert!(active.load(Ordering::SeqCst));

        let start = Instant::now();
        assert_eq!(window.end(start), None);
        assert_eq!(window.deadline(), start + Duration::from_secs(2));
        assert_eq!(
            window.end(start + Duration::from_secs(2)),
            Some(CaptureEnd::Silence)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_extends_window() {
        let active = Arc::new(AtomicBool::new(false));
        let (mut window, _rx) = window(&active);
        let start = Instant::now();

        tokio::time::advance(Duration::from_millis(1500)).await;
        window.push(&loud(0), Instant::now());
        assert!(window.heard_speech());
        assert_eq!(window.end(start + Duration::from_secs(3)), None);
        assert_eq!(window.deadline(), start + Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_record_wins_over_continuous_speech() {
        let active = Arc::new(AtomicBool::new(false));
        let (mut window, _rx) = window(&active);
        let start = Instant::now();
        window.push(&loud(0), start + Duration::from_secs(30));
        assert_eq!(
            window.end(start + Duration::from_secs(30)),
            Some(CaptureEnd::MaxRecordTime)
        );
    }

    #[tokio::test]
    async fn test_drop_releases_and_reports() {
        let active = Arc::new(AtomicBool::new(false));
        let (mut window, mut rx) = window(&active);
        window.push(&loud(0), Instant::now());
        window.push(&loud(1), Instant::now());

        let audio = window.into_audio();
        assert_eq!(audio.len(), 320);
        assert!(!active.load(Ordering::SeqCst));
        assert_eq!(rx.try_recv().unwrap(), AssistantEvent::CaptureStarted);
        assert_eq!(
            rx.try_recv().unwrap(),
            AssistantEvent::CaptureReleased { frames: 2 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_timer() {
        let timer = CooldownTimer::start(Duration::from_secs(4));
        assert!(!timer.is_expired(Instant::now()));
        assert_eq!(timer.remaining(Instant::now()), Duration::from_secs(4));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(timer.is_expired(Instant::now()));
        assert_eq!(timer.remaining(Instant::now()), Duration::ZERO);
    }
}
