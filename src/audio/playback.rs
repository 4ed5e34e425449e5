//! Blocking speaker output for synthesized replies.
//!
//! Mono reply audio is resampled to the output device's native rate and
//! copied to every channel. The output callback owns the frames and signals
//! completion over a channel once it has written the last one.

use super::resample;
use crate::config::AudioConfig;
use crate::error::{CabinError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, StreamConfig};
use crossbeam_channel::{RecvTimeoutError, bounded};
use std::time::Duration;
use tracing::{debug, error, info};

/// Extra wait beyond the nominal clip length before giving up on the device.
const DRAIN_SLACK: Duration = Duration::from_secs(2);

/// Speaker output through cpal.
pub struct CpalPlayback {
    device: Device,
    stream_config: StreamConfig,
}

impl CpalPlayback {
    /// Open `audio.output_device`, or the host default when unset.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Audio` if the device is missing or reports no
    /// usable output format.
    pub fn new(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_output(&host, audio.output_device.as_deref())?;
        let format = device
            .default_output_config()
            .map_err(|e| CabinError::Audio(format!("speaker has no output format: {e}")))?;

        let stream_config = StreamConfig {
            channels: format.channels().max(1),
            sample_rate: format.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            "speaker: {} ({} ch @ {} Hz)",
            device_label(&device),
            stream_config.channels,
            stream_config.sample_rate
        );

        Ok(Self {
            device,
            stream_config,
        })
    }

    /// Play `samples` (mono, at `sample_rate`) and return once the last
    /// frame has been handed to the device.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Audio` if the stream cannot be opened or the
    /// device stops consuming audio.
    pub fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device_rate = self.stream_config.sample_rate;
        let frames = resample(samples, sample_rate, device_rate);
        let clip = Duration::from_secs_f64(frames.len() as f64 / f64::from(device_rate.max(1)));
        let channels = usize::from(self.stream_config.channels);

        let (done_tx, done_rx) = bounded::<()>(1);
        let mut pending = frames.into_iter();
        let mut signalled = false;

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in out.chunks_mut(channels) {
                        frame.fill(pending.next().unwrap_or(0.0));
                    }
                    if !signalled && pending.len() == 0 {
                        signalled = true;
                        let _ = done_tx.try_send(());
                    }
                },
                |e| error!("speaker stream error: {e}"),
                None,
            )
            .map_err(|e| CabinError::Audio(format!("cannot open speaker stream: {e}")))?;
        stream
            .play()
            .map_err(|e| CabinError::Audio(format!("cannot start speaker stream: {e}")))?;

        debug!("playing {:.2}s", clip.as_secs_f32());
        match done_rx.recv_timeout(clip + DRAIN_SLACK) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(CabinError::Audio(
                "speaker stopped consuming audio".into(),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CabinError::Audio("speaker stream closed early".into()))
            }
        }
    }

    /// Names of all output devices on the default host.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Audio` if the host cannot enumerate devices.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let devices = cpal::default_host()
            .output_devices()
            .map_err(|e| CabinError::Audio(format!("cannot list speakers: {e}")))?;
        Ok(devices.map(|d| device_label(&d)).collect())
    }
}

fn select_output(host: &Host, wanted: Option<&str>) -> Result<Device> {
    let Some(wanted) = wanted else {
        return host
            .default_output_device()
            .ok_or_else(|| CabinError::Audio("no speaker available".into()));
    };
    host.output_devices()
        .map_err(|e| CabinError::Audio(format!("cannot list speakers: {e}")))?
        .find(|d| device_label(d) == wanted)
        .ok_or_else(|| CabinError::Audio(format!("speaker '{wanted}' not found")))
}

fn device_label(device: &Device) -> String {
    device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned())
}
