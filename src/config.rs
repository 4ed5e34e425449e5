//! Configuration types for the voice command pipeline.

use crate::error::{CabinError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CabinConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Wake word spotter settings.
    pub wakeword: WakewordConfig,
    /// Utterance capture settings (speech onset / phrase limits).
    pub capture: CaptureConfig,
    /// Wake loop and session timing.
    pub session: SessionConfig,
    /// Chat API settings.
    pub llm: LlmConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Status bus settings.
    pub status: StatusConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Pipeline sample rate in Hz. The wake word spotter requires 16 kHz.
    pub input_sample_rate: u32,
    /// Samples per blocking read from the microphone.
    pub chunk_samples: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            // 80ms at 16kHz
            chunk_samples: 1280,
            input_device: None,
            output_device: None,
        }
    }
}

/// Wake word detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakewordConfig {
    /// Whether the wake loop should be started at all.
    pub enabled: bool,
    /// Display form of the wake phrase, used in status messages.
    pub phrase: String,
    /// Directory of 16 kHz mono WAV recordings of the phrase.
    pub references_dir: PathBuf,
    /// Confidence that must be exceeded to trigger a session (0.0–1.0).
    pub threshold: f32,
    /// MFCC coefficients per frame.
    pub num_mfcc: usize,
}

impl Default for WakewordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phrase: "hey jarvis".to_owned(),
            references_dir: crate::cabin_dirs::wakeword_dir(),
            threshold: 0.5,
            num_mfcc: 13,
        }
    }
}

/// Utterance capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds to wait for speech onset before giving up.
    pub listen_timeout_secs: f32,
    /// Maximum phrase length in seconds once speech has started.
    pub phrase_time_limit_secs: f32,
    /// Leading audio used to estimate the ambient noise floor.
    pub ambient_calibration_ms: u32,
    /// Trailing silence that closes a phrase.
    pub end_silence_ms: u32,
    /// Minimum RMS for a chunk to count as speech, regardless of ambient level.
    pub energy_floor: f32,
    /// Multiplier applied to the measured ambient RMS.
    pub ambient_ratio: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            listen_timeout_secs: 5.0,
            phrase_time_limit_secs: 8.0,
            ambient_calibration_ms: 500,
            end_silence_ms: 800,
            energy_floor: 0.01,
            ambient_ratio: 1.5,
        }
    }
}

impl CaptureConfig {
    /// Speech-onset budget as a `Duration`.
    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.listen_timeout_secs.max(0.0))
    }

    /// Phrase length budget as a `Duration`.
    pub fn phrase_time_limit(&self) -> Duration {
        Duration::from_secs_f32(self.phrase_time_limit_secs.max(0.0))
    }
}

/// Wake loop and session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause after a session before the wake word is re-armed, so the
    /// assistant does not trigger on its own reply.
    pub cooldown_ms: u64,
    /// Backoff between attempts to open the microphone.
    pub retry_backoff_secs: u64,
    /// Consecutive device failures before the loop reports a persistent fault.
    pub persistent_error_after: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            retry_backoff_secs: 5,
            persistent_error_after: 3,
        }
    }
}

impl SessionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Chat API configuration (any OpenAI-compatible server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the server. A trailing `/v1` is tolerated.
    pub api_url: String,
    /// Model name to request.
    pub api_model: String,
    /// Bearer token; empty for local servers.
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// Whole-request timeout.
    pub request_timeout_secs: u64,
    /// Replaces the built-in system prompt when non-empty.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Ollama default endpoint.
            api_url: "http://localhost:11434".to_owned(),
            api_model: "llama3.2:1b".to_owned(),
            api_key: String::new(),
            // Small models follow the JSON format more reliably when cold.
            temperature: 0.2,
            max_tokens: 200,
            request_timeout_secs: 30,
            system_prompt: String::new(),
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/transcriptions` server.
    pub api_url: String,
    /// Transcription model name.
    pub model: String,
    /// Optional ISO-639-1 language hint.
    pub language: Option<String>,
    /// Request timeout.
    pub request_timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_owned(),
            model: "whisper-1".to_owned(),
            language: Some("en".to_owned()),
            request_timeout_secs: 20,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// When false, replies are printed instead of spoken.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible `/v1/audio/speech` server.
    pub api_url: String,
    /// Speech model name.
    pub model: String,
    /// Voice name.
    pub voice: String,
    /// Speaking rate in words per minute.
    pub rate_wpm: u32,
    /// Request timeout.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "http://localhost:8000".to_owned(),
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
            rate_wpm: 170,
            request_timeout_secs: 30,
        }
    }
}

/// Status bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Broadcast buffer per subscriber. Slow subscribers lose the oldest events.
    pub capacity: usize,
    /// Number of recent events kept for display.
    pub history: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            history: 20,
        }
    }
}

impl CabinConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| CabinError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serialize to pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CabinError::Config(e.to_string()))
    }

    /// Load from `path` if given, else from the default path if it exists,
    /// else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Self::default_config_path();
        if default_path.exists() {
            Self::from_file(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::cabin_dirs::config_file()
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.audio.input_sample_rate == 0 {
            return Err(CabinError::Config("audio.input_sample_rate must be > 0".into()));
        }
        if self.audio.chunk_samples == 0 {
            return Err(CabinError::Config("audio.chunk_samples must be > 0".into()));
        }
        if !(self.wakeword.threshold > 0.0 && self.wakeword.threshold < 1.0) {
            return Err(CabinError::Config(format!(
                "wakeword.threshold must be in (0, 1), got {}",
                self.wakeword.threshold
            )));
        }
        if self.capture.listen_timeout_secs <= 0.0 || self.capture.phrase_time_limit_secs <= 0.0 {
            return Err(CabinError::Config(
                "capture timeouts must be positive".into(),
            ));
        }
        if self.llm.api_model.trim().is_empty() {
            return Err(CabinError::Config("llm.api_model must not be empty".into()));
        }
        if self.status.capacity == 0 {
            return Err(CabinError::Config("status.capacity must be > 0".into()));
        }
        Ok(())
    }
}
