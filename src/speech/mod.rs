//! Speech engine contracts
//!
//! Both engines are opaque to the core. The orchestrator bounds every call
//! with a timeout and races it against shutdown and cancel requests.

use async_trait::async_trait;

use crate::error::Result;

/// Speech-to-text over a captured segment of 16-bit mono PCM
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Fails with `RecognitionFailed` on unintelligible or empty input
    async fn recognize(&self, audio: &[i16]) -> Result<String>;
}

/// Text-to-speech with playback
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` and resolve once playback has completed
    ///
    /// Fails with `SynthesisFailed`.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Abort in-flight playback and release the output device
    fn stop(&self);
}
