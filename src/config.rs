//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "WAKE_ASSISTANT_CONFIG";

/// Upper bound for every configured duration
const MAX_DURATION_SECS: f64 = 86_400.0;

const MAX_ERROR_RETRIES: u32 = 1000;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME is not set, cannot locate the data directory")]
    NoHome,

    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Assistant configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub trigger: TriggerConfig,
    pub capture: CaptureConfig,
    pub speech: SpeechConfig,
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
    pub commands: CommandsConfig,
}

/// Fixed frame format negotiated with the audio source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per frame (1280 = 80ms at 16kHz)
    pub frame_samples: usize,
    /// Bounded channel capacity between the producer and the orchestrator
    pub frame_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Phrase the scorer listens for
    pub phrase: String,
    pub threshold: f32,
    pub cooldown_secs: f64,
    /// Frames discarded unscored after the detector resumes
    pub rearm_discard_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub silence_timeout_secs: f64,
    pub max_record_secs: f64,
    /// RMS level (0.0 - 1.0) above which a frame counts as speech
    pub speech_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub language: String,
    pub voice: String,
    pub recognition_timeout_secs: f64,
    pub speak_timeout_secs: f64,
    /// Spoken right after a trigger, before the capture window opens
    pub acknowledgement: Option<String>,
    /// Spoken once when the assistant starts
    pub startup_greeting: Option<String>,
    pub fallback_response: String,
    pub failure_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Consecutive error-state entries tolerated before shutting down
    pub max_error_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub launch: Vec<LaunchConfig>,
}

/// A command that spawns an external program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub keywords: Vec<String>,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub web: bool,
    pub response: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_samples: 1280,
            frame_buffer: 64,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            phrase: "hey jarvis".to_string(),
            threshold: 0.5,
            cooldown_secs: 4.0,
            rearm_discard_frames: 15,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_timeout_secs: 2.0,
            max_record_secs: 30.0,
            speech_threshold: 0.02,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            voice: "default".to_string(),
            recognition_timeout_secs: 15.0,
            speak_timeout_secs: 30.0,
            acknowledgement: Some("Yes?".to_string()),
            startup_greeting: Some("System ready".to_string()),
            fallback_response: "Sorry, I did not understand that.".to_string(),
            failure_response: "Sorry, that did not work.".to_string(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_error_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default data directory: `$HOME/.local/share/wake-assistant`
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("wake-assistant"))
    }

    /// Resolve the config path from the environment or the data directory
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Ok(Self::data_dir()?.join("config.toml")),
        }
    }

    /// Load and validate configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from a TOML file
    ///
    /// A missing file yields defaults. Malformed TOML and out-of-range values
    /// are errors.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.trigger.threshold) {
            return Err(invalid("trigger.threshold", "must be within [0, 1]"));
        }
        if self.trigger.phrase.trim().is_empty() {
            return Err(invalid("trigger.phrase", "must not be empty"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.frame_samples == 0 {
            return Err(invalid("audio.frame_samples", "must be positive"));
        }
        if self.audio.frame_buffer == 0 {
            return Err(invalid("audio.frame_buffer", "must be positive"));
        }
        for (key, value) in [
            ("trigger.cooldown_secs", self.trigger.cooldown_secs),
            ("capture.silence_timeout_secs", self.capture.silence_timeout_secs),
            ("capture.max_record_secs", self.capture.max_record_secs),
            (
                "speech.recognition_timeout_secs",
                self.speech.recognition_timeout_secs,
            ),
            ("speech.speak_timeout_secs", self.speech.speak_timeout_secs),
        ] {
            if !value.is_finite() || value <= 0.0 || value > MAX_DURATION_SECS {
                return Err(invalid(
                    key,
                    "must be a positive number of seconds, at most one day",
                ));
            }
        }
        if self.recovery.max_error_retries > MAX_ERROR_RETRIES {
            return Err(invalid("recovery.max_error_retries", "must be at most 1000"));
        }
        if self.recovery.retry_backoff_ms > MAX_DURATION_SECS as u64 * 1000 {
            return Err(invalid("recovery.retry_backoff_ms", "must be at most one day"));
        }
        if self.capture.max_record_secs < self.capture.silence_timeout_secs {
            return Err(invalid(
                "capture.max_record_secs",
                "must not be shorter than capture.silence_timeout_secs",
            ));
        }
        if !(0.0..=1.0).contains(&self.capture.speech_threshold) {
            return Err(invalid("capture.speech_threshold", "must be within [0, 1]"));
        }
        for launch in &self.commands.launch {
            if launch.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    key: "commands.launch.keywords",
                    message: format!("command '{}' has no keywords", launch.name),
                });
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.trigger.cooldown_secs)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.capture.silence_timeout_secs)
    }

    pub fn max_record_time(&self) -> Duration {
        Duration::from_secs_f64(self.capture.max_record_secs)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.speech.recognition_timeout_secs)
    }

    pub fn speak_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.speech.speak_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery.retry_backoff_ms)
    }

    /// Wall-clock length of one frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.audio.frame_samples as f64 / self.audio.sample_rate as f64)
    }
}

fn invalid(key: &'static str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: message.to_string(),
    }
}
