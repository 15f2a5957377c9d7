//! Reader configuration.
//!
//! Everything the pipeline needs is enumerated here; nothing is read from
//! ambient state. Configs can be built in code or loaded from TOML.

use crate::preprocess::DEFAULT_SILENCE_FRAME_LENGTH;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Parameters of the pitch-salience tracker used for local conditioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub fmin: f32,
    pub fmax: f32,
    /// Fraction of the per-frame maximum a bin must exceed to be a candidate.
    pub threshold: f32,
    /// Maximum number of peaks kept per frame.
    pub max_peaks: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048, // 1025 channels
            hop_length: 512,
            fmin: 150.0,
            fmax: 4000.0,
            threshold: 0.1,
            max_peaks: 6,
        }
    }
}

/// Full reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub audio_dir: PathBuf,
    pub extensions: Vec<String>,
    pub sample_rate: u32,
    pub category_conditioning: bool,
    pub local_conditioning: bool,
    pub receptive_field: usize,
    /// Hop between windows. `None` feeds whole files.
    pub sample_size: Option<usize>,
    /// RMS threshold for silence trimming. `None` disables trimming.
    pub silence_threshold: Option<f32>,
    pub silence_frame_length: usize,
    pub trim_tail_seconds: f32,
    pub queue_capacity: usize,
    pub thread_count: usize,
    pub seed: u64,
    pub pitch: PitchConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("."),
            extensions: vec!["wav".to_string()],
            sample_rate: 16000,
            category_conditioning: false,
            local_conditioning: false,
            receptive_field: 5117,
            sample_size: None,
            silence_threshold: None,
            silence_frame_length: DEFAULT_SILENCE_FRAME_LENGTH,
            trim_tail_seconds: 5.0,
            queue_capacity: 32,
            thread_count: 1,
            seed: 0,
            pitch: PitchConfig::default(),
        }
    }
}

impl ReaderConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be > 0");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be > 0");
        }
        if self.thread_count == 0 {
            return invalid("thread_count must be > 0");
        }
        if self.sample_size == Some(0) {
            return invalid("sample_size must be > 0 when set");
        }
        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.is_empty()) {
            return invalid("extensions must be a non-empty list of non-empty strings");
        }
        if self.silence_frame_length == 0 {
            return invalid("silence_frame_length must be > 0");
        }
        if let Some(t) = self.silence_threshold {
            if !t.is_finite() || t < 0.0 {
                return invalid("silence_threshold must be finite and >= 0");
            }
        }
        if !self.trim_tail_seconds.is_finite() || self.trim_tail_seconds < 0.0 {
            return invalid("trim_tail_seconds must be finite and >= 0");
        }

        let pitch = &self.pitch;
        if pitch.n_fft < 2 {
            return invalid("pitch.n_fft must be >= 2");
        }
        if pitch.hop_length == 0 {
            return invalid("pitch.hop_length must be > 0");
        }
        if !(pitch.fmin >= 0.0 && pitch.fmin < pitch.fmax) {
            return invalid("pitch.fmin must be >= 0 and below pitch.fmax");
        }
        if !pitch.threshold.is_finite() || pitch.threshold < 0.0 {
            return invalid("pitch.threshold must be finite and >= 0");
        }
        if pitch.max_peaks == 0 {
            return invalid("pitch.max_peaks must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReaderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.thread_count, 1);
        assert_eq!(config.silence_frame_length, 2048);
        assert_eq!(config.sample_size, None);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ReaderConfig::from_toml_str(
            r#"
            audio_dir = "/data/corpus"
            sample_rate = 22050
            category_conditioning = true
            receptive_field = 1000
            sample_size = 4000
            silence_threshold = 0.3

            [pitch]
            max_peaks = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.audio_dir, PathBuf::from("/data/corpus"));
        assert_eq!(config.sample_rate, 22050);
        assert!(config.category_conditioning);
        assert!(!config.local_conditioning);
        assert_eq!(config.sample_size, Some(4000));
        assert_eq!(config.silence_threshold, Some(0.3));
        assert_eq!(config.pitch.max_peaks, 4);
        assert_eq!(config.pitch.n_fft, 2048);
        assert_eq!(config.queue_capacity, 32);
    }

    fn assert_rejected(mutate: impl Fn(&mut ReaderConfig)) {
        let mut config = ReaderConfig::default();
        mutate(&mut config);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_invalid() {
        assert_rejected(|c| c.sample_rate = 0);
        assert_rejected(|c| c.queue_capacity = 0);
        assert_rejected(|c| c.thread_count = 0);
        assert_rejected(|c| c.sample_size = Some(0));
        assert_rejected(|c| c.extensions.clear());
        assert_rejected(|c| c.silence_threshold = Some(f32::NAN));
        assert_rejected(|c| c.trim_tail_seconds = -1.0);
        assert_rejected(|c| c.pitch.hop_length = 0);
        assert_rejected(|c| c.pitch.fmin = 5000.0);
        assert_rejected(|c| c.pitch.max_peaks = 0);
    }

    #[test]
    fn test_parse_error() {
        let err = ReaderConfig::from_toml_str("sample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ReaderConfig::load("/nonexistent/reader.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
