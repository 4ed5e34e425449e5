//! WAV encoding and decoding with `hound`.
//!
//! Used for wake-word references on disk, STT uploads and TTS responses.
//! Everything is mono f32 in memory and 16-bit PCM on the wire.

use crate::error::{CabinError, Result};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

fn spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(s: f32) -> i16 {
    (s * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode mono samples as a 16-bit PCM WAV byte buffer.
///
/// # Errors
///
/// Returns `CabinError::Audio` if encoding fails.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec(sample_rate))
            .map_err(|e| CabinError::Audio(format!("cannot create WAV: {e}")))?;
        for &s in samples {
            writer
                .write_sample(to_i16(s))
                .map_err(|e| CabinError::Audio(format!("WAV write error: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| CabinError::Audio(format!("WAV finalize error: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Write mono samples to a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns `CabinError::Audio` if the file cannot be written.
pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, spec(sample_rate))
        .map_err(|e| CabinError::Audio(format!("cannot create {}: {e}", path.display())))?;
    for &s in samples {
        writer
            .write_sample(to_i16(s))
            .map_err(|e| CabinError::Audio(format!("WAV write error: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| CabinError::Audio(format!("WAV finalize error: {e}")))?;
    Ok(())
}

/// Decode a WAV byte buffer to mono samples and its sample rate.
///
/// # Errors
///
/// Returns `CabinError::Audio` for malformed input.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| CabinError::Audio(format!("invalid WAV data: {e}")))?;
    read_mono(reader)
}

/// Read a WAV file to mono samples and its sample rate.
///
/// # Errors
///
/// Returns `CabinError::Audio` if the file is missing or malformed.
pub fn read_wav_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| CabinError::Audio(format!("cannot open WAV {}: {e}", path.display())))?;
    read_mono(reader)
}

fn read_mono<R: Read + Seek>(mut reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32)> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| CabinError::Audio(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| CabinError::Audio(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    Ok((super::to_mono(&samples, spec.channels), spec.sample_rate))
}
