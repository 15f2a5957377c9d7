//! Per-window conditioning: the owning file's category id and a sparse
//! pitch-salience embedding.

use crate::catalog::AudioFile;
use crate::pitch::{PitchMagnitudes, PitchTracker};

/// Frame-major binary indicator matrix, `[n_frames, n_channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditioningEmbedding {
    pub n_frames: usize,
    pub n_channels: usize,
    pub data: Vec<f32>,
}

impl ConditioningEmbedding {
    pub fn row(&self, frame: usize) -> &[f32] {
        &self.data[frame * self.n_channels..(frame + 1) * self.n_channels]
    }
}

/// Keep, per frame, the `max_peaks` largest nonzero magnitudes as 1.0.
///
/// Equal magnitudes are ranked by ascending index, so the result is
/// deterministic for a fixed input.
pub fn sparsify(magnitudes: &PitchMagnitudes, max_peaks: usize) -> ConditioningEmbedding {
    let n_channels = magnitudes.n_channels;
    let mut data = vec![0.0f32; magnitudes.n_frames * n_channels];
    let mut candidates: Vec<(usize, f32)> = Vec::with_capacity(n_channels);

    for (frame, row) in magnitudes.frames().zip(data.chunks_exact_mut(n_channels.max(1))) {
        candidates.clear();
        candidates.extend(frame.iter().copied().enumerate().filter(|&(_, m)| m != 0.0));
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for &(idx, _) in candidates.iter().take(max_peaks) {
            row[idx] = 1.0;
        }
    }

    ConditioningEmbedding {
        n_frames: magnitudes.n_frames,
        n_channels,
        data,
    }
}

pub struct ConditioningExtractor {
    category_enabled: bool,
    pitch: Option<Box<dyn PitchTracker>>,
    max_peaks: usize,
}

impl ConditioningExtractor {
    pub fn new(category_enabled: bool, pitch: Option<Box<dyn PitchTracker>>, max_peaks: usize) -> Self {
        Self {
            category_enabled,
            pitch,
            max_peaks,
        }
    }

    /// Channel count of pitch embeddings, if local conditioning is on.
    pub fn pitch_channels(&self) -> Option<usize> {
        self.pitch.as_ref().map(|p| p.channels())
    }

    /// The owning file's id, or `None` when category conditioning is off.
    pub fn category_embedding(&self, file: &AudioFile) -> Option<u32> {
        if self.category_enabled {
            file.category_id
        } else {
            None
        }
    }

    /// Sparse pitch embedding of one window, or `None` when local
    /// conditioning is off.
    pub fn pitch_embedding(&self, window: &[f32]) -> Option<ConditioningEmbedding> {
        let tracker = self.pitch.as_ref()?;
        Some(sparsify(&tracker.magnitudes(window), self.max_peaks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mags(rows: &[&[f32]]) -> PitchMagnitudes {
        PitchMagnitudes {
            n_frames: rows.len(),
            n_channels: rows[0].len(),
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        }
    }

    struct FixedTracker(PitchMagnitudes);

    impl PitchTracker for FixedTracker {
        fn channels(&self) -> usize {
            self.0.n_channels
        }

        fn magnitudes(&self, _samples: &[f32]) -> PitchMagnitudes {
            self.0.clone()
        }
    }

    #[test]
    fn test_sparsify_keeps_largest() {
        let input = mags(&[&[0.0, 9.0, 1.0, 8.0, 2.0, 7.0, 3.0, 6.0, 4.0, 5.0]]);
        let out = sparsify(&input, 6);
        assert_eq!(out.row(0), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_sparsify_fewer_nonzero_than_k() {
        let input = mags(&[&[0.0, 0.5, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0]]);
        let out = sparsify(&input, 6);
        assert_eq!(out.row(0), &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sparsify_zero_row() {
        let input = mags(&[&[0.0; 5], &[1.0, 0.0, 0.0, 0.0, 0.0]]);
        let out = sparsify(&input, 6);
        assert!(out.row(0).iter().all(|&v| v == 0.0));
        assert_eq!(out.row(1), &[1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sparsify_ties_prefer_lower_index() {
        let input = mags(&[&[1.0; 10]]);
        let out = sparsify(&input, 6);
        assert_eq!(out.row(0), &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sparsify_rows_at_most_k() {
        let rows: Vec<Vec<f32>> = (0..20)
            .map(|f| (0..64).map(|c| ((c * 7 + f * 13) % 11) as f32).collect())
            .collect();
        let refs: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let input = mags(&refs);
        let out = sparsify(&input, 6);

        for f in 0..out.n_frames {
            let row = out.row(f);
            assert!(row.iter().filter(|&&v| v != 0.0).count() <= 6);
            let min_kept = row
                .iter()
                .zip(input.frame(f))
                .filter(|(o, _)| **o == 1.0)
                .map(|(_, m)| *m)
                .fold(f32::INFINITY, f32::min);
            let max_dropped = row
                .iter()
                .zip(input.frame(f))
                .filter(|(o, _)| **o == 0.0)
                .map(|(_, m)| *m)
                .fold(f32::NEG_INFINITY, f32::max);
            assert!(min_kept >= max_dropped);
        }
    }

    #[test]
    fn test_extractor_toggles() {
        let file = AudioFile {
            path: PathBuf::from("p4_1.wav"),
            category_id: Some(4),
        };
        let tracker = FixedTracker(mags(&[&[0.0, 2.0, 1.0]]));

        let on = ConditioningExtractor::new(true, Some(Box::new(tracker)), 1);
        assert_eq!(on.category_embedding(&file), Some(4));
        assert_eq!(on.pitch_channels(), Some(3));
        let emb = on.pitch_embedding(&[0.0; 8]).unwrap();
        assert_eq!(emb.row(0), &[0.0, 1.0, 0.0]);

        let off = ConditioningExtractor::new(false, None, 6);
        assert_eq!(off.category_embedding(&file), None);
        assert!(off.pitch_embedding(&[0.0; 8]).is_none());
        assert_eq!(off.pitch_channels(), None);
    }
}
