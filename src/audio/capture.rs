//! Microphone audio capture using cpal.
//!
//! Captures audio at the device's native sample rate and converts it to
//! 16kHz mono for wake-word scoring and utterance recording. Consumers read
//! fixed-size chunks with a blocking call, so capture code is always run
//! under `spawn_blocking` or on a dedicated thread.

use super::{AudioChunk, resample, to_mono};
use crate::config::AudioConfig;
use crate::error::{CabinError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Blocking source of mono audio chunks.
///
/// Dropping the source releases the underlying device.
pub trait AudioSource: Send {
    /// Wait up to `timeout` for the next chunk.
    ///
    /// Returns `Ok(None)` if no chunk arrived in time.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Audio` if the stream failed or was closed.
    fn read_chunk(&mut self, timeout: Duration) -> Result<Option<AudioChunk>>;

    /// Sample rate of the chunks this source yields.
    fn sample_rate(&self) -> u32;
}

/// Something that can open an [`AudioSource`].
pub trait Microphone: Send + Sync {
    /// Whether an input device is present at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Open a capture stream. Blocking.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Audio` if the device cannot be opened.
    fn open(&self) -> Result<Box<dyn AudioSource>>;
}

/// System microphone via cpal.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    config: AudioConfig,
}

impl CpalMicrophone {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CabinError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl Microphone for CpalMicrophone {
    fn is_available(&self) -> bool {
        let host = cpal::default_host();
        match &self.config.input_device {
            Some(_) => find_input_device(&host, &self.config).is_ok(),
            None => host.default_input_device().is_some(),
        }
    }

    fn open(&self) -> Result<Box<dyn AudioSource>> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (audio_tx, audio_rx) = crossbeam_channel::bounded::<Vec<f32>>(64);
        let (error_tx, error_rx) = crossbeam_channel::bounded::<String>(4);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let config = self.config.clone();

        // cpal streams are not Send on every platform, so the stream lives on
        // its own thread until the source is dropped.
        std::thread::Builder::new()
            .name("cabin-mic".into())
            .spawn(move || {
                let stream = match build_stream(&config, audio_tx, error_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Disconnects when the source drops its sender.
                let _ = stop_rx.recv();
                drop(stream);
                info!("audio capture stopped");
            })
            .map_err(|e| CabinError::Audio(format!("cannot spawn capture thread: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(CabinError::Audio("capture thread did not start".into())),
        }

        Ok(Box::new(CpalSource {
            audio_rx,
            error_rx,
            _stop: stop_tx,
            pending: Vec::new(),
            chunk_samples: self.config.chunk_samples.max(1),
            sample_rate: self.config.input_sample_rate,
        }))
    }
}

fn find_input_device(host: &cpal::Host, config: &AudioConfig) -> Result<cpal::Device> {
    if let Some(ref name) = config.input_device {
        host.input_devices()
            .map_err(|e| CabinError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| CabinError::Audio(format!("input device '{name}' not found")))
    } else {
        host.default_input_device()
            .ok_or_else(|| CabinError::Audio("no default input device".into()))
    }
}

fn build_stream(
    config: &AudioConfig,
    audio_tx: Sender<Vec<f32>>,
    error_tx: Sender<String>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = find_input_device(&host, config)?;

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_name}");

    let default_config = device
        .default_input_config()
        .map_err(|e| CabinError::Audio(format!("no default input config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let target_rate = config.input_sample_rate;

    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = to_mono(data, native_channels);
                let samples = resample(&mono, native_rate, target_rate);
                // Never block the audio thread.
                if audio_tx.try_send(samples).is_err() {
                    debug!("audio channel full, dropping block");
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
                let _ = error_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| CabinError::Audio(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CabinError::Audio(format!("failed to start input stream: {e}")))?;

    info!(
        "audio capture started: native {}Hz x{} -> target {}Hz",
        native_rate, native_channels, target_rate
    );
    Ok(stream)
}

/// Re-chunks cpal callback blocks into fixed-size chunks.
struct CpalSource {
    audio_rx: Receiver<Vec<f32>>,
    error_rx: Receiver<String>,
    _stop: Sender<()>,
    pending: Vec<f32>,
    chunk_samples: usize,
    sample_rate: u32,
}

impl AudioSource for CpalSource {
    fn read_chunk(&mut self, timeout: Duration) -> Result<Option<AudioChunk>> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < self.chunk_samples {
            match self.error_rx.try_recv() {
                Ok(msg) => return Err(CabinError::Audio(msg)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(CabinError::Audio("input stream closed".into()));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.audio_rx.recv_timeout(remaining) {
                Ok(block) => self.pending.extend_from_slice(&block),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CabinError::Audio("input stream closed".into()));
                }
            }
        }

        let samples: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
        Ok(Some(AudioChunk::new(samples, self.sample_rate)))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
