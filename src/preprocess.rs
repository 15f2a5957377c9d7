//! Waveform preprocessing: peak normalization, tail/silence trimming and
//! receptive-field padding.

/// Default frame length for RMS silence detection.
pub const DEFAULT_SILENCE_FRAME_LENGTH: usize = 2048;

/// Scale so the peak absolute value is 1.0. All-zero input is returned unchanged.
pub fn normalize(mut waveform: Vec<f32>) -> Vec<f32> {
    let peak = waveform.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak > 0.0 && peak.is_finite() {
        let scale = 1.0 / peak;
        waveform.iter_mut().for_each(|s| *s *= scale);
    }
    waveform
}

/// Drop the last `seconds * sample_rate` samples.
///
/// Zero seconds is a no-op; a waveform shorter than the tail becomes empty.
pub fn trim_trailing_seconds(mut waveform: Vec<f32>, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let tail = (seconds.max(0.0) as f64 * sample_rate as f64).round() as usize;
    let keep = waveform.len().saturating_sub(tail);
    waveform.truncate(keep);
    waveform
}

/// RMS energy of consecutive non-overlapping frames of `frame_length` samples.
/// The last frame may be shorter.
pub fn frame_rms(waveform: &[f32], frame_length: usize) -> Vec<f32> {
    let frame_length = frame_length.max(1);
    waveform
        .chunks(frame_length)
        .map(|frame| {
            let power = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
            power.sqrt()
        })
        .collect()
}

/// Keep the span from the first to the last frame whose RMS exceeds `threshold`.
///
/// `frame_length` is clamped to the waveform length. Returns an empty
/// waveform when no frame exceeds the threshold; when every frame does, the
/// input comes back unchanged.
pub fn trim_silence(waveform: &[f32], threshold: f32, frame_length: usize) -> Vec<f32> {
    if waveform.is_empty() {
        return Vec::new();
    }
    let frame_length = frame_length.clamp(1, waveform.len());
    let energy = frame_rms(waveform, frame_length);

    let first = energy.iter().position(|&e| e > threshold);
    let last = energy.iter().rposition(|&e| e > threshold);
    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first * frame_length;
            let end = ((last + 1) * frame_length).min(waveform.len());
            waveform[start..end].to_vec()
        }
        _ => Vec::new(),
    }
}

/// Prepend `receptive_field` zeros.
pub fn pad_head(waveform: &[f32], receptive_field: usize) -> Vec<f32> {
    let mut padded = Vec::with_capacity(receptive_field + waveform.len());
    padded.resize(receptive_field, 0.0);
    padded.extend_from_slice(waveform);
    padded
}
