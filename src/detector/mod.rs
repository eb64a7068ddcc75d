//! Trigger-word detection
//!
//! [`TriggerDetector`] wraps an opaque scoring model and applies the
//! threshold. While paused it short-circuits every frame without running
//! inference, so frame delivery never stops but nothing can trigger.

use tracing::{debug, info};

use crate::audio::AudioFrame;

/// The trigger-word scoring model
pub trait WakeScorer: Send {
    /// Confidence in 0.0 - 1.0 that the trigger phrase ends in this frame
    fn score(&mut self, frame: &AudioFrame) -> f32;

    /// Drop any rolling window or short-term state
    fn reset(&mut self);
}

/// Outcome of evaluating one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub triggered: bool,
    pub confidence: f32,
}

impl DetectionResult {
    pub const SILENT: DetectionResult = DetectionResult {
        triggered: false,
        confidence: 0.0,
    };
}

/// Threshold policy plus pause/resume around a [`WakeScorer`]
pub struct TriggerDetector {
    scorer: Box<dyn WakeScorer>,
    threshold: f32,
    rearm_discard_frames: u32,
    paused: bool,
    /// Frames still to be skipped after the last resume
    discard_remaining: u32,
}

impl TriggerDetector {
    /// Create a detector; it starts paused until the assistant arms it
    pub fn new(scorer: Box<dyn WakeScorer>, threshold: f32, rearm_discard_frames: u32) -> Self {
        Self {
            scorer,
            threshold: threshold.clamp(0.0, 1.0),
            rearm_discard_frames,
            paused: true,
            discard_remaining: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Score one frame
    pub fn evaluate(&mut self, frame: &AudioFrame) -> DetectionResult {
        if self.paused {
            return DetectionResult::SILENT;
        }
        if self.discard_remaining > 0 {
            self.discard_remaining -= 1;
            return DetectionResult::SILENT;
        }

        let confidence = self.scorer.score(frame).clamp(0.0, 1.0);
        let triggered = confidence >= self.threshold;
        if triggered {
            info!(confidence, threshold = self.threshold, seq = frame.seq, "trigger detected");
        }
        DetectionResult {
            triggered,
            confidence,
        }
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!("trigger detection paused");
        }
    }

    /// Resume detection, discarding short-term state from before the pause
    pub fn resume(&mut self) {
        self.scorer.reset();
        self.discard_remaining = self.rearm_discard_frames;
        self.paused = false;
        debug!(discard = self.rearm_discard_frames, "trigger detection resumed");
    }

    /// Full reset after a component fault; leaves the detector paused
    pub fn reset(&mut self) {
        self.scorer.reset();
        self.discard_remaining = 0;
        self.paused = true;
    }
}
