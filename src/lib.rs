//! Background audio feeder for training loops.
//!
//! Multi-threaded producer pipeline with:
//! - Recursive file discovery with category ids parsed from file names
//! - Audio decoding (symphonia) and resampling (rubato)
//! - Peak normalization, tail and silence trimming, receptive-field padding
//! - Overlapping fixed-size windows
//! - Optional category id and sparse pitch-salience conditioning per window
//! - A bounded, backpressured, cancellable queue drained in aligned batches

pub mod cancel;
pub mod catalog;
pub mod conditioning;
pub mod config;
pub mod decode;
pub mod logging;
pub mod pitch;
pub mod pool;
pub mod preprocess;
pub mod queue;
pub mod reader;
pub mod segment;
pub mod spectrogram;

#[cfg(feature = "python")]
mod python;

pub use cancel::CancellationToken;
pub use catalog::{AudioFile, CatalogError, CategoryCardinality, FileCatalog};
pub use conditioning::{ConditioningEmbedding, ConditioningExtractor};
pub use config::{ConfigError, PitchConfig, ReaderConfig};
pub use decode::{AudioDecoder, DecodeError, SymphoniaDecoder};
pub use queue::{Batch, Example, ExampleQueue, QueueError};
pub use reader::{AudioReader, ReaderError};
