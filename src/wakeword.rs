//! Lightweight MFCC-based wake word spotter.
//!
//! Detects the wake phrase (e.g. "hey jarvis") in a live audio stream by
//! comparing MFCC features of the last second of audio against stored
//! reference recordings, using DTW (Dynamic Time Warping) for
//! time-invariant comparison. The detector reports a confidence in
//! `[0, 1]`; the wake loop owns the threshold decision.
//!
//! References are 16kHz mono WAV files in the configured directory.

use crate::audio::wav;
use crate::config::WakewordConfig;
use crate::error::{CabinError, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of MFCC coefficients used when the config says 0.
const DEFAULT_NUM_MFCC: usize = 13;
/// FFT window size in samples (25ms at 16kHz).
const FRAME_SIZE: usize = 400;
/// Hop size in samples (10ms at 16kHz).
const HOP_SIZE: usize = 160;
/// Number of mel filter banks.
const NUM_MEL_FILTERS: usize = 26;
/// Audio is not resampled here; callers provide 16kHz.
pub const EXPECTED_SAMPLE_RATE: u32 = 16_000;

/// Scores audio for the presence of a wake phrase.
pub trait WakewordDetector: Send {
    /// Feed the next block of samples and return the current confidence
    /// in `[0, 1]`. Returns 0 until enough audio has been buffered.
    fn score(&mut self, samples: &[f32]) -> f32;

    /// Drop buffered audio, e.g. after a detection.
    fn reset(&mut self);
}

/// Builds detectors on demand. Loading happens once per wake loop start.
pub trait WakewordLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns `CabinError::Wakeword` if no usable model is available.
    fn load(&self) -> Result<Box<dyn WakewordDetector>>;
}

/// Loads a [`WakewordSpotter`] from the reference directory in config.
#[derive(Debug, Clone)]
pub struct ReferenceLoader {
    config: WakewordConfig,
}

impl ReferenceLoader {
    pub fn new(config: &WakewordConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl WakewordLoader for ReferenceLoader {
    fn load(&self) -> Result<Box<dyn WakewordDetector>> {
        if !self.config.enabled {
            return Err(CabinError::Wakeword("wake word detection is disabled".into()));
        }
        Ok(Box::new(WakewordSpotter::new(&self.config, EXPECTED_SAMPLE_RATE)?))
    }
}

/// MFCC feature extractor with a cached FFT plan, window and filterbank.
pub struct MfccExtractor {
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    mel_filterbank: Vec<Vec<f32>>,
    num_mfcc: usize,
}

impl MfccExtractor {
    pub fn new(num_mfcc: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FRAME_SIZE);
        let hann = (0..FRAME_SIZE)
            .map(|n| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (FRAME_SIZE - 1) as f32).cos())
            })
            .collect();
        Self {
            fft,
            hann,
            mel_filterbank: build_mel_filterbank(NUM_MEL_FILTERS, FRAME_SIZE, sample_rate),
            num_mfcc: if num_mfcc > 0 { num_mfcc } else { DEFAULT_NUM_MFCC },
        }
    }

    /// One MFCC vector per 10ms hop. Empty if shorter than one frame.
    pub fn extract(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        if samples.len() < FRAME_SIZE {
            return Vec::new();
        }

        let num_frames = (samples.len() - FRAME_SIZE) / HOP_SIZE + 1;
        let power_len = FRAME_SIZE / 2 + 1;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); FRAME_SIZE];
        let mut frames = Vec::with_capacity(num_frames);

        for start in (0..num_frames).map(|i| i * HOP_SIZE) {
            for ((slot, &s), &w) in buffer
                .iter_mut()
                .zip(&samples[start..start + FRAME_SIZE])
                .zip(&self.hann)
            {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut buffer);

            let power: Vec<f32> = buffer[..power_len]
                .iter()
                .map(|c| (c.re * c.re + c.im * c.im) / FRAME_SIZE as f32)
                .collect();

            let log_mel: Vec<f32> = self
                .mel_filterbank
                .iter()
                .map(|filter| {
                    let energy: f32 = filter.iter().zip(&power).map(|(&f, &p)| f * p).sum();
                    energy.max(1e-10).ln()
                })
                .collect();

            frames.push(dct_ii(&log_mel, self.num_mfcc));
        }

        frames
    }
}

/// Wake word spotter that compares live audio against reference recordings.
pub struct WakewordSpotter {
    references: Vec<Vec<Vec<f32>>>,
    extractor: MfccExtractor,
    /// Accumulates samples until a full detection window (~1s) is available.
    audio_buffer: Vec<f32>,
    window_samples: usize,
    /// Samples received since the last comparison.
    since_last: usize,
    /// Compare at most every `stride` samples.
    stride: usize,
    last_score: f32,
}

impl WakewordSpotter {
    /// Create a spotter and load reference recordings from
    /// `config.references_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample rate is not 16kHz or no references
    /// can be loaded.
    pub fn new(config: &WakewordConfig, sample_rate: u32) -> Result<Self> {
        if sample_rate != EXPECTED_SAMPLE_RATE {
            return Err(CabinError::Wakeword(format!(
                "spotter requires {EXPECTED_SAMPLE_RATE}Hz audio, got {sample_rate}Hz"
            )));
        }

        let recordings = load_reference_recordings(&config.references_dir)?;
        let spotter = Self::from_recordings(&recordings, config.num_mfcc)?;
        info!(
            "wakeword spotter for '{}' loaded {} references",
            config.phrase,
            spotter.reference_count()
        );
        Ok(spotter)
    }

    /// Build a spotter from in-memory 16kHz reference recordings.
    ///
    /// # Errors
    ///
    /// Returns an error if none of the recordings yields features.
    pub fn from_recordings(recordings: &[Vec<f32>], num_mfcc: usize) -> Result<Self> {
        let extractor = MfccExtractor::new(num_mfcc, EXPECTED_SAMPLE_RATE);
        let references: Vec<Vec<Vec<f32>>> = recordings
            .iter()
            .map(|r| extractor.extract(r))
            .filter(|mfccs| !mfccs.is_empty())
            .collect();

        if references.is_empty() {
            return Err(CabinError::Wakeword(
                "no wake word reference recordings found".into(),
            ));
        }

        let window_samples = EXPECTED_SAMPLE_RATE as usize;
        Ok(Self {
            references,
            extractor,
            audio_buffer: Vec::with_capacity(window_samples * 2),
            window_samples,
            since_last: 0,
            stride: window_samples / 4,
            last_score: 0.0,
        })
    }

    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }
}

impl WakewordDetector for WakewordSpotter {
    fn score(&mut self, samples: &[f32]) -> f32 {
        self.audio_buffer.extend_from_slice(samples);
        self.since_last += samples.len();

        if self.audio_buffer.len() < self.window_samples {
            return 0.0;
        }
        let excess = self.audio_buffer.len() - self.window_samples;
        self.audio_buffer.drain(..excess);

        // DTW over a full second is the expensive part; rescore on a stride.
        if self.since_last < self.stride {
            return self.last_score;
        }
        self.since_last = 0;

        let mfccs = self.extractor.extract(&self.audio_buffer);
        self.last_score = self
            .references
            .iter()
            .map(|reference| 1.0 / (1.0 + dtw_distance(&mfccs, reference)))
            .fold(0.0f32, f32::max);
        self.last_score
    }

    fn reset(&mut self) {
        self.audio_buffer.clear();
        self.since_last = 0;
        self.last_score = 0.0;
    }
}

/// Load every `.wav` file in `dir` as 16kHz mono samples.
///
/// Files with the wrong rate or that fail to decode are skipped with a warning.
fn load_reference_recordings(dir: &Path) -> Result<Vec<Vec<f32>>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| CabinError::Wakeword(format!("cannot read references dir: {e}")))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("wav"))
        .collect();
    paths.sort();

    let mut recordings = Vec::new();
    for path in paths {
        match wav::read_wav_file(&path) {
            Ok((samples, EXPECTED_SAMPLE_RATE)) => {
                info!("loaded wakeword reference: {}", path.display());
                recordings.push(samples);
            }
            Ok((_, rate)) => {
                warn!(
                    "skipping reference {}: {rate}Hz, expected {EXPECTED_SAMPLE_RATE}Hz",
                    path.display()
                );
            }
            Err(e) => warn!("skipping invalid reference {}: {e}", path.display()),
        }
    }
    Ok(recordings)
}

/// Save a reference recording into `dir` under the next free `ref_N.wav` name.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_reference(dir: &Path, samples: &[f32], sample_rate: u32) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = (1..)
        .map(|n| dir.join(format!("ref_{n}.wav")))
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join("ref.wav"));
    wav::write_wav_file(&path, samples, sample_rate)?;
    info!("saved wakeword reference: {}", path.display());
    Ok(path)
}

// ── MFCC helpers ────────────────────────────────────────────────────

/// Build mel-spaced triangular filterbank.
fn build_mel_filterbank(num_filters: usize, fft_size: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let power_len = fft_size / 2 + 1;
    let low_mel = hz_to_mel(0.0);
    let high_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let num_points = num_filters + 2;
    let bins: Vec<usize> = (0..num_points)
        .map(|i| low_mel + (high_mel - low_mel) * i as f32 / (num_points - 1) as f32)
        .map(|mel| ((fft_size as f32 + 1.0) * mel_to_hz(mel) / sample_rate as f32).floor() as usize)
        .collect();

    bins.windows(3)
        .map(|w| {
            let (left, center, right) = (w[0], w[1], w[2]);
            let mut filter = vec![0.0f32; power_len];
            for (i, val) in filter.iter_mut().enumerate() {
                if i >= left && i < center && center > left {
                    *val = (i - left) as f32 / (center - left) as f32;
                } else if i >= center && i <= right && right > center {
                    *val = (right - i) as f32 / (right - center) as f32;
                }
            }
            filter
        })
        .collect()
}

/// DCT-II: extract `num_coeffs` coefficients from `input`.
fn dct_ii(input: &[f32], num_coeffs: usize) -> Vec<f32> {
    let n = input.len();
    (0..num_coeffs)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, &val)| {
                    val * (std::f32::consts::PI * k as f32 * (2 * i + 1) as f32 / (2 * n) as f32).cos()
                })
                .sum()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

// ── DTW ─────────────────────────────────────────────────────────────

/// DTW distance between two MFCC sequences, normalized by path length.
///
/// Keeps only two rows of the cost matrix.
fn dtw_distance(input: &[Vec<f32>], reference: &[Vec<f32>]) -> f32 {
    let n = input.len();
    let m = reference.len();
    if n == 0 || m == 0 {
        return f32::MAX;
    }

    let mut prev = vec![f32::MAX; m + 1];
    let mut curr = vec![f32::MAX; m + 1];
    prev[0] = 0.0;

    for a in input {
        curr[0] = f32::MAX;
        for j in 1..=m {
            let d = euclidean_distance(a, &reference[j - 1]);
            let best = prev[j].min(curr[j - 1]).min(prev[j - 1]);
            curr[j] = d + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m] / (n + m) as f32
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
