//! Short-time Fourier magnitude spectrogram.
//!
//! Frames are centred: the signal is zero-padded by `n_fft / 2` on both
//! sides, giving `1 + len / hop_length` frames. Output is frame-major,
//! `[n_frames, n_fft / 2 + 1]`.

use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

/// Precomputed magnitude STFT.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);

        // Periodic Hann window
        let window: Vec<f32> = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
            .collect();

        Self {
            n_fft,
            hop_length,
            fft,
            window,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Number of centred frames for a signal of `n_samples`.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        if n_samples == 0 {
            0
        } else {
            1 + n_samples / self.hop_length
        }
    }

    /// Magnitude spectrogram, frame-major.
    pub fn magnitude(&self, samples: &[f32]) -> Vec<f32> {
        let n_fft = self.n_fft;
        let n_bins = self.n_bins();
        let n_frames = self.n_frames(samples.len());
        let pad = (n_fft / 2) as isize;

        let mut output = vec![0.0f32; n_frames * n_bins];
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        for frame in 0..n_frames {
            let start = (frame * self.hop_length) as isize - pad;

            for (i, slot) in input.iter_mut().enumerate() {
                let idx = start + i as isize;
                *slot = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize] * self.window[i]
                } else {
                    0.0
                };
            }

            // Buffer lengths come from the plan itself, so processing cannot fail.
            if self
                .fft
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .is_err()
            {
                continue;
            }

            let row = &mut output[frame * n_bins..(frame + 1) * n_bins];
            for (out, c) in row.iter_mut().zip(spectrum.iter()) {
                *out = c.norm();
            }
        }

        output
    }
}
