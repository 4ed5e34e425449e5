//! Error types for the cabin voice pipeline.

use crate::actions::ActionError;

/// Top-level error type for the voice command pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CabinError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word model loading or inference error.
    #[error("wake word error: {0}")]
    Wakeword(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Chat API transport or provider error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech synthesis or playback error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// An action handler rejected its arguments.
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Pipeline coordination error (empty input, task failure).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CabinError>;
