//! Energy-based speech gating for end-of-utterance detection

use std::time::Duration;

use tokio::time::Instant;

/// RMS level of 16-bit samples normalized to 0.0 - 1.0
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Tracks silence inside a capture window
///
/// Silence is measured from the last speech frame, or from the moment the
/// gate opened when nothing loud has been heard yet.
#[derive(Debug)]
pub struct SpeechGate {
    threshold: f32,
    last_speech_at: Instant,
    heard_speech: bool,
}

impl SpeechGate {
    pub fn new(threshold: f32, now: Instant) -> Self {
        Self {
            threshold,
            last_speech_at: now,
            heard_speech: false,
        }
    }

    /// Feed a frame level observed at `now`; returns whether it was speech
    pub fn observe(&mut self, level: f32, now: Instant) -> bool {
        let speech = level >= self.threshold;
        if speech {
            self.last_speech_at = now;
            self.heard_speech = true;
        }
        speech
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_speech_at)
    }

    /// Last speech frame, or the opening instant if none
    pub fn last_speech_at(&self) -> Instant {
        self.last_speech_at
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[0; 160]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_full_scale_square_is_one() {
        let samples: Vec<i16> = (0..160)
            .map(|i| if i % 2 == 0 { i16::MAX } else { -i16::MAX })
            .collect();
        assert!((rms_level(&samples) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_gate_resets_silence_on_speech() {
        let start = Instant::now();
        let mut gate = SpeechGate::new(0.02, start);

        assert!(!gate.observe(0.001, start + Duration::from_millis(500)));
        assert_eq!(gate.silence(start + Duration::from_millis(500)), Duration::from_millis(500));
        assert!(!gate.heard_speech());

        assert!(gate.observe(0.3, start + Duration::from_secs(1)));
        assert!(gate.heard_speech());
        assert_eq!(
            gate.silence(start + Duration::from_millis(1200)),
            Duration::from_millis(200)
        );
    }
}
