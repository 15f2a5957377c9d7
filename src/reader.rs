//! Background audio reader.
//!
//! Architecture:
//! Producer threads -> bounded example queue -> training loop
//!
//! - Startup validates the config and the corpus before any thread starts
//! - Producers decode, trim, pad, segment and condition files in parallel
//! - The training loop pulls fixed-size batches, whole or per data kind

use crate::cancel::CancellationToken;
use crate::catalog::{CatalogError, CategoryCardinality, FileCatalog};
use crate::conditioning::{ConditioningEmbedding, ConditioningExtractor};
use crate::config::{ConfigError, ReaderConfig};
use crate::decode::{AudioDecoder, SymphoniaDecoder};
use crate::pitch::{Piptrack, PitchTracker};
use crate::pool::{Producer, ProducerPool, ProducerSettings};
use crate::queue::{Batch, ExampleQueue, QueueError, QueueKinds};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Failed to spawn producer thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Producer threads already started")]
    AlreadyStarted,
}

pub struct AudioReader {
    config: ReaderConfig,
    catalog: Arc<FileCatalog>,
    cardinality: Option<CategoryCardinality>,
    decoder: Arc<dyn AudioDecoder>,
    conditioning: Arc<ConditioningExtractor>,
    queue: Arc<ExampleQueue>,
    cancel: CancellationToken,
    pool: Option<ProducerPool>,
}

impl AudioReader {
    /// Validate the config and corpus using the symphonia decoder.
    pub fn new(config: ReaderConfig) -> Result<Self, ReaderError> {
        Self::with_decoder(config, Arc::new(SymphoniaDecoder))
    }

    pub fn with_decoder(config: ReaderConfig, decoder: Arc<dyn AudioDecoder>) -> Result<Self, ReaderError> {
        config.validate()?;
        let catalog = FileCatalog::discover(&config.audio_dir, &config.extensions)?;
        Self::with_catalog(config, catalog, decoder)
    }

    /// Build a reader over an already discovered catalog.
    pub fn with_catalog(
        config: ReaderConfig,
        catalog: FileCatalog,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<Self, ReaderError> {
        config.validate()?;
        tracing::info!("found {} audio files in {}", catalog.len(), catalog.root().display());

        let cardinality = if config.category_conditioning {
            catalog.validate_for_conditioning()?;
            let card = catalog.cardinality()?;
            tracing::info!(
                "detected category cardinality {} (ids {}..={})",
                card.table_size(),
                card.min_id,
                card.max_id
            );
            Some(card)
        } else {
            None
        };

        let pitch: Option<Box<dyn PitchTracker>> = config
            .local_conditioning
            .then(|| Box::new(Piptrack::new(config.sample_rate, &config.pitch)) as Box<dyn PitchTracker>);
        let conditioning =
            ConditioningExtractor::new(config.category_conditioning, pitch, config.pitch.max_peaks);

        let cancel = CancellationToken::new();
        let kinds = QueueKinds {
            category: config.category_conditioning,
            conditioning_channels: conditioning.pitch_channels(),
        };
        let queue = ExampleQueue::new(config.queue_capacity, kinds, cancel.clone());

        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            cardinality,
            decoder,
            conditioning: Arc::new(conditioning),
            queue: Arc::new(queue),
            cancel,
            pool: None,
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Embedding table size for category conditioning (`max_id + 1`).
    pub fn category_cardinality(&self) -> Option<u32> {
        self.cardinality.map(|c| c.table_size())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start `config.thread_count` producer threads.
    pub fn start(&mut self) -> Result<(), ReaderError> {
        self.start_threads(self.config.thread_count)
    }

    pub fn start_threads(&mut self, n_threads: usize) -> Result<(), ReaderError> {
        if self.pool.is_some() || self.cancel.is_cancelled() {
            return Err(ReaderError::AlreadyStarted);
        }
        if n_threads == 0 {
            return Err(ConfigError::Invalid("n_threads must be > 0".to_string()).into());
        }

        let producer = Producer {
            catalog: Arc::clone(&self.catalog),
            decoder: Arc::clone(&self.decoder),
            conditioning: Arc::clone(&self.conditioning),
            queue: Arc::clone(&self.queue),
            settings: ProducerSettings {
                sample_rate: self.config.sample_rate,
                receptive_field: self.config.receptive_field,
                sample_size: self.config.sample_size,
                silence_threshold: self.config.silence_threshold,
                silence_frame_length: self.config.silence_frame_length,
                trim_tail_seconds: self.config.trim_tail_seconds,
            },
        };
        self.pool = Some(ProducerPool::start(producer, n_threads, self.config.seed)?);
        Ok(())
    }

    /// Blocking pull of `n` windows.
    pub fn dequeue(&self, n: usize) -> Result<Vec<Vec<f32>>, QueueError> {
        self.queue.dequeue(n)
    }

    /// Blocking pull of `n` category ids, aligned with `dequeue`.
    pub fn dequeue_category(&self, n: usize) -> Result<Vec<u32>, QueueError> {
        self.queue.dequeue_category(n)
    }

    /// Blocking pull of `n` pitch embeddings, aligned with `dequeue`.
    pub fn dequeue_conditioning(&self, n: usize) -> Result<Vec<ConditioningEmbedding>, QueueError> {
        self.queue.dequeue_conditioning(n)
    }

    /// Like `dequeue`, but returns `QueueError::Timeout` after `timeout`.
    /// Windows already pulled stay staged for the next call.
    pub fn dequeue_timeout(&self, n: usize, timeout: Duration) -> Result<Vec<Vec<f32>>, QueueError> {
        self.queue.dequeue_timeout(n, timeout)
    }

    pub fn dequeue_category_timeout(&self, n: usize, timeout: Duration) -> Result<Vec<u32>, QueueError> {
        self.queue.dequeue_category_timeout(n, timeout)
    }

    pub fn dequeue_conditioning_timeout(
        &self,
        n: usize,
        timeout: Duration,
    ) -> Result<Vec<ConditioningEmbedding>, QueueError> {
        self.queue.dequeue_conditioning_timeout(n, timeout)
    }

    pub fn dequeue_batch(&self, n: usize) -> Result<Batch, QueueError> {
        self.queue.dequeue_batch(n)
    }

    /// Cancel and join all producers. Pending pops return `Cancelled` once
    /// the buffered examples run out.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(mut pool) = self.pool.take() {
            pool.stop();
        }
    }
}

impl Drop for AudioReader {
    fn drop(&mut self) {
        self.stop();
    }
}
