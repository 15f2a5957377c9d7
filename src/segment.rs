//! Sliding-window segmentation of a padded waveform.
//!
//! With `window_len = receptive_field + sample_size`, each step emits the
//! first `window_len` samples and advances by `sample_size`, so consecutive
//! windows share `receptive_field` samples. Stepping stops once the remaining
//! length is `<= window_len`; that trailing remainder is dropped.

/// Lazy, single-use sequence of windows over one padded waveform.
pub struct Windows<'a> {
    remaining: &'a [f32],
    receptive_field: usize,
    sample_size: Option<usize>,
    done: bool,
}

/// Segment `padded` into windows. `None` for `sample_size` yields the whole
/// waveform once.
pub fn segment(padded: &[f32], receptive_field: usize, sample_size: Option<usize>) -> Windows<'_> {
    Windows {
        remaining: padded,
        receptive_field,
        sample_size,
        done: false,
    }
}

/// Number of windows `segment` emits for a padded waveform of `len` samples.
pub fn window_count(len: usize, receptive_field: usize, sample_size: Option<usize>) -> usize {
    match sample_size {
        None => 1,
        Some(0) => 0,
        Some(hop) => {
            let window = receptive_field + hop;
            if len > window {
                (len - window).div_ceil(hop)
            } else {
                0
            }
        }
    }
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(hop) = self.sample_size else {
            self.done = true;
            return Some(self.remaining);
        };

        let window = self.receptive_field + hop;
        if hop == 0 || self.remaining.len() <= window {
            self.done = true;
            return None;
        }

        let piece = &self.remaining[..window];
        self.remaining = &self.remaining[hop..];
        Some(piece)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.done {
            0
        } else {
            window_count(self.remaining.len(), self.receptive_field, self.sample_size)
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Windows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_window_lengths_and_count() {
        let (r, s) = (1000, 4000);
        let padded = ramp(81000);

        let windows: Vec<_> = segment(&padded, r, Some(s)).collect();
        assert_eq!(windows.len(), (81000 - r - s) / s);
        assert!(windows.iter().all(|w| w.len() == r + s));
    }

    #[test]
    fn test_overlap_is_receptive_field() {
        let (r, s) = (3, 5);
        let padded = ramp(40);

        let windows: Vec<_> = segment(&padded, r, Some(s)).collect();
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w[0], (i * s) as f32);
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[1][..r], pair[0][s..s + r]);
        }
    }

    #[test]
    fn test_short_input_yields_nothing() {
        let padded = ramp(5);
        assert_eq!(segment(&padded, 2, Some(3)).count(), 0);
        assert_eq!(segment(&padded, 2, Some(4)).count(), 0);
        assert_eq!(segment(&[], 2, Some(3)).count(), 0);
    }

    #[test]
    fn test_partial_remainder_is_dropped() {
        // 10 > 5 emit [0..5), 6 > 5 emit [4..9), 2 <= 5 stop
        let padded = ramp(10);
        let windows: Vec<_> = segment(&padded, 1, Some(4)).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], &padded[4..9]);
        assert_eq!(window_count(10, 1, Some(4)), 2);
    }

    #[test]
    fn test_whole_file_mode() {
        let padded = ramp(7);
        let windows: Vec<_> = segment(&padded, 3, None).collect();
        assert_eq!(windows, vec![&padded[..]]);
    }

    #[test]
    fn test_size_hint_matches_count() {
        for len in [0, 5, 9, 10, 21, 100] {
            let padded = ramp(len);
            let iter = segment(&padded, 2, Some(3));
            let hint = iter.len();
            assert_eq!(hint, iter.count(), "len={len}");
        }
    }
}
