//! Speech-to-text via an OpenAI-compatible transcription endpoint.
//!
//! Captured audio is encoded as 16-bit WAV and posted as multipart form data
//! to `POST /v1/audio/transcriptions` (whisper.cpp server, faster-whisper
//! server, llama-server, OpenAI).

use crate::audio::{Utterance, wav};
use crate::config::SttConfig;
use crate::error::{CabinError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of transcribing one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    Text(String),
    /// The audio was empty; nothing was sent.
    NoSpeech,
    /// The service answered but found no words.
    Unrecognized,
}

impl Transcript {
    /// Classify raw service output.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.chars().any(char::is_alphanumeric) {
            Self::Text(text.to_owned())
        } else {
            Self::Unrecognized
        }
    }
}

/// A speech recognizer.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// # Errors
    ///
    /// Returns `CabinError::Stt` if the service cannot be reached or fails.
    async fn transcribe(&self, utterance: &Utterance) -> Result<Transcript>;
}

/// Transcriber that posts WAV audio to an HTTP endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    model: String,
    language: Option<String>,
}

impl HttpTranscriber {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CabinError::Stt(format!("cannot build HTTP client: {e}")))?;
        let base = config.api_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        let url = format!("{base}/v1/audio/transcriptions");
        info!("STT endpoint: {url} model={}", config.model);
        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            language: config.language.clone().filter(|l| !l.is_empty()),
        })
    }
}

#[async_trait]
impl SpeechToText for HttpTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> Result<Transcript> {
        if utterance.samples.is_empty() {
            return Ok(Transcript::NoSpeech);
        }

        let bytes = wav::encode_wav(&utterance.samples, utterance.sample_rate)
            .map_err(|e| CabinError::Stt(e.to_string()))?;
        let file = Part::bytes(bytes)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| CabinError::Stt(format!("invalid multipart: {e}")))?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CabinError::Stt(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CabinError::Stt(format!("HTTP {status}: {}", body.trim())));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CabinError::Stt(format!("invalid response body: {e}")))?;
        let text = payload["text"].as_str().unwrap_or_default();
        debug!(
            "transcribed {:.2}s of audio in {:.2}s: {text:?}",
            utterance.duration().as_secs_f32(),
            started.elapsed().as_secs_f32()
        );
        Ok(Transcript::from_text(text))
    }
}
