//! Text-to-speech output.
//!
//! [`HttpSpeaker`] fetches WAV audio from an OpenAI-compatible
//! `POST /v1/audio/speech` endpoint and plays it through cpal.
//! [`ConsoleSpeaker`] prints replies instead, for text-only setups.
//! [`FallbackSpeaker`] tries one and falls back to the other.

use crate::audio::{CpalPlayback, wav};
use crate::config::{AudioConfig, TtsConfig};
use crate::error::{CabinError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rate at which the speech endpoint's `speed = 1.0` is assumed to talk.
const BASE_RATE_WPM: f32 = 170.0;

/// Speaks text to completion.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns once the whole text has been spoken.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Tts` if synthesis or playback fails.
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Prints replies to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeaker;

#[async_trait]
impl TextToSpeech for ConsoleSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        println!("[speak] {text}");
        Ok(())
    }
}

/// Speech synthesis over HTTP with local playback.
pub struct HttpSpeaker {
    client: reqwest::Client,
    url: String,
    model: String,
    voice: String,
    speed: f32,
    audio: AudioConfig,
}

impl HttpSpeaker {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig, audio: &AudioConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CabinError::Tts(format!("cannot build HTTP client: {e}")))?;
        let base = config.api_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        let url = format!("{base}/v1/audio/speech");
        info!("TTS endpoint: {url} voice={}", config.voice);
        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: speed_for_rate(config.rate_wpm),
            audio: audio.clone(),
        })
    }

    /// Fetch synthesized audio for `text` as mono samples and sample rate.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Tts` on transport, status or decoding failure.
    pub async fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32)> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
            "speed": self.speed,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CabinError::Tts(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CabinError::Tts(format!("HTTP {status}: {}", body.trim())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CabinError::Tts(format!("cannot read audio: {e}")))?;
        wav::decode_wav(&bytes).map_err(|e| CabinError::Tts(e.to_string()))
    }
}

#[async_trait]
impl TextToSpeech for HttpSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let (samples, sample_rate) = self.synthesize(text).await?;
        debug!("playing {} samples at {sample_rate}Hz", samples.len());
        let audio = self.audio.clone();
        tokio::task::spawn_blocking(move || CpalPlayback::new(&audio)?.play(&samples, sample_rate))
            .await
            .map_err(|e| CabinError::Tts(format!("playback task failed: {e}")))?
    }
}

/// Uses `primary`, and `fallback` whenever `primary` fails.
pub struct FallbackSpeaker {
    primary: Arc<dyn TextToSpeech>,
    fallback: Arc<dyn TextToSpeech>,
}

impl FallbackSpeaker {
    pub fn new(primary: Arc<dyn TextToSpeech>, fallback: Arc<dyn TextToSpeech>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl TextToSpeech for FallbackSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        match self.primary.speak(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("speech output failed, falling back: {e}");
                self.fallback.speak(text).await
            }
        }
    }
}

/// Speech output for `config`: HTTP synthesis with a console fallback, or
/// console only when synthesis is disabled or cannot be set up.
pub fn speaker_from_config(config: &TtsConfig, audio: &AudioConfig) -> Arc<dyn TextToSpeech> {
    if !config.enabled {
        return Arc::new(ConsoleSpeaker);
    }
    match HttpSpeaker::new(config, audio) {
        Ok(http) => Arc::new(FallbackSpeaker::new(Arc::new(http), Arc::new(ConsoleSpeaker))),
        Err(e) => {
            warn!("speech synthesis unavailable: {e}");
            Arc::new(ConsoleSpeaker)
        }
    }
}

fn speed_for_rate(rate_wpm: u32) -> f32 {
    (rate_wpm as f32 / BASE_RATE_WPM).clamp(0.25, 4.0)
}
