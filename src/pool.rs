//! Producer worker pool.
//!
//! Each worker runs an infinite sequence of epochs. An epoch draws
//! `catalog.len()` files uniformly at random with replacement, then for each
//! file: decode -> normalize -> trim -> pad -> segment -> condition -> push.
//! Workers share only the read-only catalog and the queue; every worker has
//! its own RNG seeded from `seed + worker_index`.

use crate::cancel::CancellationToken;
use crate::catalog::{AudioFile, FileCatalog};
use crate::conditioning::ConditioningExtractor;
use crate::decode::AudioDecoder;
use crate::preprocess::{normalize, pad_head, trim_silence, trim_trailing_seconds};
use crate::queue::{Example, ExampleQueue, QueueError};
use crate::segment::segment;

use rand::prelude::*;
use rand::rngs::StdRng;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-file processing parameters, copied into every worker.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub sample_rate: u32,
    pub receptive_field: usize,
    pub sample_size: Option<usize>,
    pub silence_threshold: Option<f32>,
    pub silence_frame_length: usize,
    pub trim_tail_seconds: f32,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// All windows were pushed.
    Enqueued(usize),
    /// Nothing was pushed (decode failure or nothing left after trimming).
    Skipped,
    /// Cancellation was observed after this many windows were pushed.
    Cancelled(usize),
}

/// Everything a worker needs, shared across workers.
#[derive(Clone)]
pub struct Producer {
    pub catalog: Arc<FileCatalog>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub conditioning: Arc<ConditioningExtractor>,
    pub queue: Arc<ExampleQueue>,
    pub settings: ProducerSettings,
}

impl Producer {
    /// Decode and trim one file. `None` means skip it.
    fn load_waveform(&self, file: &AudioFile) -> Option<Vec<f32>> {
        let s = &self.settings;
        let audio = match self.decoder.decode(&file.path, s.sample_rate) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("skipping {}: decode error: {}", file.path.display(), e);
                return None;
            }
        };

        let mut audio = normalize(audio);
        // Skip the roll-out at the end of each recording
        audio = trim_trailing_seconds(audio, s.sample_rate, s.trim_tail_seconds);

        if let Some(threshold) = s.silence_threshold {
            audio = trim_silence(&audio, threshold, s.silence_frame_length);
            if audio.is_empty() {
                tracing::warn!(
                    "{} was ignored as it contains only silence. Consider decreasing the \
                     silence threshold, or adjust volume of the audio.",
                    file.path.display()
                );
                return None;
            }
        }

        if audio.is_empty() {
            tracing::warn!("{} is empty after trimming, skipping", file.path.display());
            return None;
        }
        Some(audio)
    }

    /// Push every window of one file, in order.
    pub fn process_file(&self, file: &AudioFile, cancel: &CancellationToken) -> FileOutcome {
        let Some(audio) = self.load_waveform(file) else {
            return FileOutcome::Skipped;
        };

        let s = &self.settings;
        let padded = pad_head(&audio, s.receptive_field);
        drop(audio);

        let mut pushed = 0;
        for window in segment(&padded, s.receptive_field, s.sample_size) {
            if cancel.is_cancelled() {
                return FileOutcome::Cancelled(pushed);
            }

            let example = Example {
                window: window.to_vec(),
                category_id: self.conditioning.category_embedding(file),
                conditioning: self.conditioning.pitch_embedding(window),
            };

            match self.queue.push(example) {
                Ok(()) => pushed += 1,
                Err(QueueError::Cancelled) => return FileOutcome::Cancelled(pushed),
                Err(e) => {
                    tracing::warn!("dropping rest of {}: {}", file.path.display(), e);
                    return if pushed == 0 {
                        FileOutcome::Skipped
                    } else {
                        FileOutcome::Enqueued(pushed)
                    };
                }
            }
        }

        if pushed == 0 {
            tracing::debug!("{} is shorter than one window", file.path.display());
        }
        FileOutcome::Enqueued(pushed)
    }
}

/// One epoch of file indices: `n` uniform draws with replacement.
pub fn epoch_order(n: usize, rng: &mut StdRng) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

fn worker_thread_main(producer: Producer, worker_index: usize, seed: u64, cancel: CancellationToken) {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(worker_index as u64));
    let mut epoch: u64 = 0;

    loop {
        for file_idx in epoch_order(producer.catalog.len(), &mut rng) {
            if cancel.is_cancelled() {
                tracing::debug!("worker {} stopping in epoch {}", worker_index, epoch);
                return;
            }
            let Some(file) = producer.catalog.get(file_idx) else {
                continue;
            };

            match producer.process_file(file, &cancel) {
                FileOutcome::Enqueued(n) => {
                    tracing::trace!("worker {}: {} windows from {}", worker_index, n, file.path.display())
                }
                FileOutcome::Skipped => {}
                FileOutcome::Cancelled(_) => {
                    tracing::debug!("worker {} cancelled mid-file", worker_index);
                    return;
                }
            }
        }
        epoch = epoch.wrapping_add(1);
    }
}

/// Running producer threads.
pub struct ProducerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ProducerPool {
    /// Spawn `n_threads` workers. If any spawn fails, already-started
    /// workers are cancelled and joined before the error is returned.
    ///
    /// Workers observe the queue's cancellation token.
    pub fn start(producer: Producer, n_threads: usize, seed: u64) -> io::Result<Self> {
        let cancel = producer.queue.cancellation_token();
        let mut pool = Self {
            cancel: cancel.clone(),
            handles: Vec::with_capacity(n_threads),
        };

        for worker_index in 0..n_threads {
            let producer = producer.clone();
            let cancel = cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("audio-producer-{worker_index}"))
                .spawn(move || worker_thread_main(producer, worker_index, seed, cancel));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.stop();
                    return Err(e);
                }
            }
        }

        tracing::info!("started {} producer threads", n_threads);
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal cancellation and wait for every worker to exit.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        for h in self.handles.drain(..) {
            if h.join().is_err() {
                tracing::error!("producer thread panicked");
            }
        }
    }
}

impl Drop for ProducerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
