//! Pitch-salience tracking.
//!
//! `PitchTracker` is the black-box contract the conditioning extractor relies
//! on: given a window of samples, return per-frame magnitude vectors with a
//! fixed channel count, nonzero only at detected pitch candidates.
//! `Piptrack` is the default tracker: thresholded local maxima of a centred
//! STFT magnitude, refined by parabolic interpolation.

use crate::config::PitchConfig;
use crate::spectrogram::Stft;

/// Frame-major pitch magnitudes, `[n_frames, n_channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchMagnitudes {
    pub n_frames: usize,
    pub n_channels: usize,
    pub data: Vec<f32>,
}

impl PitchMagnitudes {
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.n_channels..(index + 1) * self.n_channels]
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        // max(1) keeps chunks_exact valid for a zero-channel tracker
        self.data.chunks_exact(self.n_channels.max(1))
    }
}

pub trait PitchTracker: Send + Sync {
    /// Channel count of every returned frame.
    fn channels(&self) -> usize;

    fn magnitudes(&self, samples: &[f32]) -> PitchMagnitudes;
}

/// Local-maximum pitch tracker over a centred magnitude STFT.
///
/// The `fmin..fmax` band is mapped to bins with the sample rate passed to
/// `new`, which the reader sets to the pipeline rate. Trackers that assume a
/// fixed 22050 Hz rate select a different band for the same `fmin`/`fmax`
/// whenever the pipeline runs at another rate.
pub struct Piptrack {
    stft: Stft,
    sample_rate: u32,
    fmin: f32,
    fmax: f32,
    threshold: f32,
}

impl Piptrack {
    pub fn new(sample_rate: u32, config: &PitchConfig) -> Self {
        Self {
            stft: Stft::new(config.n_fft, config.hop_length),
            sample_rate,
            fmin: config.fmin,
            fmax: config.fmax,
            threshold: config.threshold,
        }
    }

    fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.stft.n_fft() as f32
    }

    /// Pick pitch candidates in one spectrum frame, writing refined
    /// magnitudes into `out` (same length, pre-zeroed).
    fn pick_frame(&self, spectrum: &[f32], out: &mut [f32]) {
        let n = spectrum.len();
        if n < 2 {
            return;
        }

        let peak = spectrum.iter().fold(0.0f32, |acc, &m| acc.max(m));
        let reference = self.threshold * peak;
        let gated = |k: usize| {
            if spectrum[k] > reference {
                spectrum[k]
            } else {
                0.0
            }
        };

        // Bin 0 never qualifies: its left neighbour is itself.
        for k in 1..n {
            let f = self.bin_frequency(k);
            if f < self.fmin || f >= self.fmax {
                continue;
            }

            let here = gated(k);
            let right = if k + 1 < n { gated(k + 1) } else { here };
            if !(here > gated(k - 1) && here >= right) {
                continue;
            }

            let dskew = if k + 1 < n {
                let avg = 0.5 * (spectrum[k + 1] - spectrum[k - 1]);
                let curvature = 2.0 * spectrum[k] - spectrum[k + 1] - spectrum[k - 1];
                let shift = avg / (curvature + f32::MIN_POSITIVE);
                0.5 * avg * shift
            } else {
                0.0
            };
            out[k] = spectrum[k] + dskew;
        }
    }
}

impl PitchTracker for Piptrack {
    fn channels(&self) -> usize {
        self.stft.n_bins()
    }

    fn magnitudes(&self, samples: &[f32]) -> PitchMagnitudes {
        let n_channels = self.stft.n_bins();
        let n_frames = self.stft.n_frames(samples.len());
        let spectrum = self.stft.magnitude(samples);

        let mut data = vec![0.0f32; n_frames * n_channels];
        for (frame, out) in spectrum
            .chunks_exact(n_channels)
            .zip(data.chunks_exact_mut(n_channels))
        {
            self.pick_frame(frame, out);
        }

        PitchMagnitudes {
            n_frames,
            n_channels,
            data,
        }
    }
}
