//! Audio decoding using symphonia.
//!
//! Supports MP3, FLAC, OGG, WAV formats. Output is always mono at the
//! requested sample rate.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Unsupported codec")]
    UnsupportedCodec,
    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Turns a file path into a mono waveform at a target sample rate.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>, DecodeError>;
}

/// Decoder backed by symphonia with rubato resampling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>, DecodeError> {
        decode_file(path)?.resample(sample_rate)
    }
}

/// Decoded audio samples.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    /// Convert to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    /// Resample to target sample rate using sinc interpolation (rubato).
    pub fn resample(&self, target_rate: u32) -> Result<Vec<f32>, DecodeError> {
        if self.sample_rate == target_rate {
            return Ok(self.to_mono());
        }

        let mono = self.to_mono();
        if mono.is_empty() {
            return Ok(Vec::new());
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resample_ratio = target_rate as f64 / self.sample_rate as f64;
        let chunk_size = 1024;

        // max_resample_ratio_relative must cover the actual ratio in both directions
        let max_ratio = resample_ratio.max(1.0 / resample_ratio) * 1.1;

        let mut resampler = SincFixedIn::<f32>::new(resample_ratio, max_ratio, params, chunk_size, 1)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        let mut output = Vec::with_capacity((mono.len() as f64 * resample_ratio) as usize + chunk_size);
        let mut padded = vec![0.0f32; chunk_size];

        for chunk in mono.chunks(chunk_size) {
            padded[..chunk.len()].copy_from_slice(chunk);
            padded[chunk.len()..].fill(0.0);

            let resampled = resampler
                .process(&[&padded[..]], None)
                .map_err(|e| DecodeError::Resample(e.to_string()))?;
            output.extend_from_slice(&resampled[0]);
        }

        let expected_len = (mono.len() as f64 * resample_ratio).round() as usize;
        output.truncate(expected_len);

        Ok(output)
    }
}

/// Decode an audio file into interleaved samples.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let probed =
        symphonia::default::get_probe().format(&hint, mss, &format_opts, &metadata_opts)?;
    let mut format = probed.format;

    // Find the first audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let decoder_opts = DecoderOptions::default();
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decoder_opts)?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnsupportedCodec)?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let track_id = track.id;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        append_samples(&decoded, &mut samples, channels)?;
    }

    if samples.is_empty() {
        return Err(DecodeError::NoAudioTrack);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn append_samples(
    buffer: &AudioBufferRef,
    output: &mut Vec<f32>,
    channels: usize,
) -> Result<(), DecodeError> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame]);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame] as f32 / 32768.0);
                }
            }
        }
        AudioBufferRef::S24(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame].inner() as f32 / 8388608.0);
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push(buf.chan(ch)[frame] as f32 / 2147483648.0);
                }
            }
        }
        AudioBufferRef::U8(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push((buf.chan(ch)[frame] as f32 - 128.0) / 128.0);
                }
            }
        }
        _ => {
            return Err(DecodeError::UnsupportedCodec);
        }
    }
    Ok(())
}
