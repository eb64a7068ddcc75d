//! Audio frame types and the audio source contract
//!
//! The source runs on its own thread and pushes frames through a
//! [`FrameSink`]. The sink never blocks: when the orchestrator falls behind,
//! frames are dropped and counted.

mod level;

pub use level::{rms_level, SpeechGate};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;

/// One fixed-size slice of 16-bit mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Monotonic sequence number assigned by the source
    pub seq: u64,
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(seq: u64, samples: Vec<i16>) -> Self {
        Self { seq, samples }
    }

    /// Root-mean-square level normalized to 0.0 - 1.0
    pub fn level(&self) -> f32 {
        rms_level(&self.samples)
    }
}

/// Producer half of the frame channel
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSink {
    /// Create a bounded frame channel
    pub fn channel(capacity: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                dropped: Arc::clone(&dropped),
            },
            FrameStream { rx, dropped },
        )
    }

    /// Hand a frame to the consumer without waiting
    ///
    /// Returns false when the frame was dropped because the channel is full
    /// or the consumer went away.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(seq = frame.seq, "frame dropped, consumer behind");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the frame channel
#[derive(Debug)]
pub struct FrameStream {
    rx: mpsc::Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameStream {
    /// Next frame, or `None` once every sink is gone
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.rx.recv().await
    }

    /// Discard everything already queued, returning how many frames went
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Frames dropped by the producer since the last call
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Continuous capture device
///
/// This trait allows swapping implementations (real device vs mock).
pub trait AudioSource: Send {
    /// Start delivering frames into `sink` until [`AudioSource::stop`]
    ///
    /// Must return promptly; delivery happens on the source's own thread or
    /// callback. Dropping every clone of `sink` signals device failure to the
    /// consumer.
    fn stream(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop delivery and release the device
    fn stop(&mut self);

    fn is_streaming(&self) -> bool;
}
