//! Utterance recording with ambient calibration and energy-based endpointing.
//!
//! A capture runs in three stages:
//! 1. **Calibrate**: measure the room's RMS energy for a short window.
//! 2. **Wait for onset**: up to `listen_timeout` for a chunk louder than the
//!    speech threshold (`max(energy_floor, ambient * ambient_ratio)`).
//! 3. **Record**: collect chunks until `end_silence_ms` of quiet or the
//!    phrase limit, whichever comes first.
//!
//! Time is measured in captured samples, with a wall-clock backstop for
//! devices that stop delivering audio.

use super::{AudioSource, compute_rms_energy};
use crate::config::CaptureConfig;
use crate::error::Result;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Captured speech ready for transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// How a capture ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Speech(Utterance),
    /// No speech started within the listen timeout.
    Timeout,
    Cancelled,
}

/// Records one utterance from an [`AudioSource`].
#[derive(Debug, Clone)]
pub struct UtteranceRecorder {
    config: CaptureConfig,
}

impl UtteranceRecorder {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run calibration, onset detection and recording. Blocking.
    ///
    /// # Errors
    ///
    /// Propagates device errors from the source.
    pub fn record(&self, source: &mut dyn AudioSource, cancel: &CancellationToken) -> Result<CaptureOutcome> {
        let rate = source.sample_rate().max(1) as f32;
        let ms_of = |samples: usize| samples as f32 * 1000.0 / rate;

        // Calibrate.
        let mut ambient_sum = 0.0f32;
        let mut ambient_chunks = 0u32;
        let mut calibrated = 0usize;
        let calibration_started = Instant::now();
        let calibration_ms = self.config.ambient_calibration_ms as f32;
        while ms_of(calibrated) < calibration_ms {
            if cancel.is_cancelled() {
                return Ok(CaptureOutcome::Cancelled);
            }
            if calibration_started.elapsed().as_secs_f32() * 1000.0 > calibration_ms * 2.0 + 500.0 {
                break;
            }
            if let Some(chunk) = source.read_chunk(READ_TIMEOUT)? {
                ambient_sum += compute_rms_energy(&chunk.samples);
                ambient_chunks += 1;
                calibrated += chunk.samples.len();
            }
        }
        let ambient = if ambient_chunks > 0 {
            ambient_sum / ambient_chunks as f32
        } else {
            0.0
        };
        let threshold = self.threshold_for(ambient);
        debug!("ambient energy {ambient:.4}, speech threshold {threshold:.4}");

        // Wait for onset.
        let timeout = self.config.listen_timeout();
        let timeout_ms = timeout.as_secs_f32() * 1000.0;
        let onset_started = Instant::now();
        let mut waited = 0usize;
        let mut speech = loop {
            if cancel.is_cancelled() {
                return Ok(CaptureOutcome::Cancelled);
            }
            if ms_of(waited) >= timeout_ms || onset_started.elapsed() >= timeout {
                return Ok(CaptureOutcome::Timeout);
            }
            let Some(chunk) = source.read_chunk(READ_TIMEOUT)? else {
                continue;
            };
            waited += chunk.samples.len();
            if compute_rms_energy(&chunk.samples) > threshold {
                break chunk.samples;
            }
        };
        debug!("speech onset after {:.0}ms", ms_of(waited));

        // Record until trailing silence or the phrase limit.
        let limit = self.config.phrase_time_limit();
        let limit_ms = limit.as_secs_f32() * 1000.0;
        let end_silence_ms = self.config.end_silence_ms as f32;
        let phrase_started = Instant::now();
        let mut silent = 0usize;
        while ms_of(speech.len()) < limit_ms && phrase_started.elapsed() < limit {
            if cancel.is_cancelled() {
                return Ok(CaptureOutcome::Cancelled);
            }
            let Some(chunk) = source.read_chunk(READ_TIMEOUT)? else {
                continue;
            };
            if compute_rms_energy(&chunk.samples) > threshold {
                silent = 0;
            } else {
                silent += chunk.samples.len();
            }
            speech.extend_from_slice(&chunk.samples);
            if ms_of(silent) >= end_silence_ms {
                break;
            }
        }

        let max_samples = (limit.as_secs_f32() * rate) as usize;
        speech.truncate(max_samples.max(1));
        let utterance = Utterance {
            samples: speech,
            sample_rate: source.sample_rate(),
        };
        debug!("captured {:.2}s of audio", utterance.duration().as_secs_f32());
        Ok(CaptureOutcome::Speech(utterance))
    }

    fn threshold_for(&self, ambient: f32) -> f32 {
        (ambient * self.config.ambient_ratio).max(self.config.energy_floor)
    }
}
