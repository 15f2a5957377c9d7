//! Bounded example queue between producer workers and the training loop.
//!
//! Producers push composite `Example` records (window, optional category id,
//! optional pitch embedding) into one bounded channel, so records never
//! split across channels and aligned triples survive any number of
//! concurrent producers. The consumer reads either whole batches or one
//! data kind at a time; parts of records pulled for one kind wait in
//! per-kind staging FIFOs until their own kind is dequeued.
//!
//! Staging is bounded: a pull that would grow another kind's backlog past
//! `max(capacity, n)` fails with `Backlog` instead of receiving more records.

use crate::cancel::CancellationToken;
use crate::conditioning::ConditioningEmbedding;

use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue operation cancelled")]
    Cancelled,
    #[error("Timed out waiting for examples")]
    Timeout,
    #[error("Example does not match the enabled queue kinds: {0}")]
    KindMismatch(&'static str),
    #[error("Too many staged {0}s; dequeue them before pulling further")]
    Backlog(&'static str),
}

/// One training window with its conditioning.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub window: Vec<f32>,
    pub category_id: Option<u32>,
    pub conditioning: Option<ConditioningEmbedding>,
}

/// Aligned batch: element `i` of every present field belongs to the same window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub windows: Vec<Vec<f32>>,
    pub category_ids: Option<Vec<u32>>,
    pub conditioning: Option<Vec<ConditioningEmbedding>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Which optional parts every example must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueKinds {
    pub category: bool,
    /// Channel count of conditioning embeddings, if enabled.
    pub conditioning_channels: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Window,
    Category,
    Conditioning,
}

impl Part {
    fn name(self) -> &'static str {
        match self {
            Part::Window => "window",
            Part::Category => "category id",
            Part::Conditioning => "conditioning embedding",
        }
    }
}

#[derive(Default)]
struct Staged {
    windows: VecDeque<Vec<f32>>,
    category_ids: VecDeque<u32>,
    conditioning: VecDeque<ConditioningEmbedding>,
}

impl Staged {
    fn len(&self, part: Part) -> usize {
        match part {
            Part::Window => self.windows.len(),
            Part::Category => self.category_ids.len(),
            Part::Conditioning => self.conditioning.len(),
        }
    }

    fn push(&mut self, example: Example) {
        self.windows.push_back(example.window);
        if let Some(id) = example.category_id {
            self.category_ids.push_back(id);
        }
        if let Some(emb) = example.conditioning {
            self.conditioning.push_back(emb);
        }
    }
}

pub struct ExampleQueue {
    tx: Sender<Example>,
    rx: Receiver<Example>,
    capacity: usize,
    kinds: QueueKinds,
    staged: Mutex<Staged>,
    cancel: CancellationToken,
}

impl ExampleQueue {
    pub fn new(capacity: usize, kinds: QueueKinds, cancel: CancellationToken) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            kinds,
            staged: Mutex::new(Staged::default()),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Records buffered in the channel (not counting staged parts).
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn parts(&self) -> impl Iterator<Item = Part> {
        [
            Some(Part::Window),
            self.kinds.category.then_some(Part::Category),
            self.kinds.conditioning_channels.map(|_| Part::Conditioning),
        ]
        .into_iter()
        .flatten()
    }

    fn check_kinds(&self, example: &Example) -> Result<(), QueueError> {
        if example.category_id.is_some() != self.kinds.category {
            return Err(QueueError::KindMismatch("category id"));
        }
        match (&example.conditioning, self.kinds.conditioning_channels) {
            (None, None) => Ok(()),
            (Some(emb), Some(channels)) if emb.n_channels == channels => Ok(()),
            _ => Err(QueueError::KindMismatch("conditioning embedding")),
        }
    }

    /// Push an example, blocking while the queue is full.
    ///
    /// Returns `Cancelled` without pushing once cancellation is observed.
    pub fn push(&self, example: Example) -> Result<(), QueueError> {
        self.check_kinds(&example)?;

        let mut example = example;
        loop {
            if self.cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }
            match self.tx.send_timeout(example, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    example = returned; // Retry with same example
                }
                // The queue owns a receiver, so the channel cannot disconnect.
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueError::Cancelled),
            }
        }
    }

    fn lock_staged(&self) -> MutexGuard<'_, Staged> {
        // Staging holds plain data; a panicking consumer leaves it consistent.
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receive one record, blocking until one arrives, the deadline passes,
    /// or cancellation is observed with nothing buffered.
    fn recv(&self, deadline: Option<Instant>) -> Result<Example, QueueError> {
        loop {
            let wait = deadline.map_or(POLL_INTERVAL, |d| {
                d.saturating_duration_since(Instant::now()).min(POLL_INTERVAL)
            });
            match self.rx.recv_timeout(wait) {
                Ok(example) => return Ok(example),
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        return Err(QueueError::Cancelled);
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(QueueError::Timeout);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(QueueError::Cancelled),
            }
        }
    }

    /// Pull records into staging until `part` holds at least `n` entries.
    ///
    /// Records already staged survive a `Timeout`, so a retry resumes
    /// where the previous call stopped.
    fn fill(
        &self,
        staged: &mut Staged,
        part: Part,
        n: usize,
        deadline: Option<Instant>,
    ) -> Result<(), QueueError> {
        let limit = self.capacity.max(n);
        while staged.len(part) < n {
            if let Some(lagging) = self.parts().find(|&p| p != part && staged.len(p) >= limit) {
                return Err(QueueError::Backlog(lagging.name()));
            }
            let example = self.recv(deadline)?;
            staged.push(example);
        }
        Ok(())
    }

    fn pop_windows(&self, n: usize, deadline: Option<Instant>) -> Result<Vec<Vec<f32>>, QueueError> {
        let mut staged = self.lock_staged();
        self.fill(&mut staged, Part::Window, n, deadline)?;
        Ok(staged.windows.drain(..n).collect())
    }

    fn pop_category(&self, n: usize, deadline: Option<Instant>) -> Result<Vec<u32>, QueueError> {
        if !self.kinds.category {
            return Err(QueueError::KindMismatch("category id"));
        }
        let mut staged = self.lock_staged();
        self.fill(&mut staged, Part::Category, n, deadline)?;
        Ok(staged.category_ids.drain(..n).collect())
    }

    fn pop_conditioning(
        &self,
        n: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<ConditioningEmbedding>, QueueError> {
        if self.kinds.conditioning_channels.is_none() {
            return Err(QueueError::KindMismatch("conditioning embedding"));
        }
        let mut staged = self.lock_staged();
        self.fill(&mut staged, Part::Conditioning, n, deadline)?;
        Ok(staged.conditioning.drain(..n).collect())
    }

    /// Dequeue `n` windows in FIFO order.
    pub fn dequeue(&self, n: usize) -> Result<Vec<Vec<f32>>, QueueError> {
        self.pop_windows(n, None)
    }

    /// Like `dequeue`, but gives up with `Timeout` after `timeout`.
    pub fn dequeue_timeout(&self, n: usize, timeout: Duration) -> Result<Vec<Vec<f32>>, QueueError> {
        self.pop_windows(n, Some(Instant::now() + timeout))
    }

    /// Dequeue `n` category ids, aligned with `dequeue`.
    pub fn dequeue_category(&self, n: usize) -> Result<Vec<u32>, QueueError> {
        self.pop_category(n, None)
    }

    pub fn dequeue_category_timeout(&self, n: usize, timeout: Duration) -> Result<Vec<u32>, QueueError> {
        self.pop_category(n, Some(Instant::now() + timeout))
    }

    /// Dequeue `n` conditioning embeddings, aligned with `dequeue`.
    pub fn dequeue_conditioning(&self, n: usize) -> Result<Vec<ConditioningEmbedding>, QueueError> {
        self.pop_conditioning(n, None)
    }

    pub fn dequeue_conditioning_timeout(
        &self,
        n: usize,
        timeout: Duration,
    ) -> Result<Vec<ConditioningEmbedding>, QueueError> {
        self.pop_conditioning(n, Some(Instant::now() + timeout))
    }

    /// Dequeue `n` aligned examples at once.
    ///
    /// Only valid while no kind has been dequeued ahead of the others;
    /// otherwise staged parts would pair with the wrong windows.
    pub fn dequeue_batch(&self, n: usize) -> Result<Batch, QueueError> {
        let mut staged = self.lock_staged();
        let windows = staged.len(Part::Window);
        if self.parts().any(|p| staged.len(p) != windows) {
            return Err(QueueError::KindMismatch("per-kind dequeues are out of step"));
        }

        self.fill(&mut staged, Part::Window, n, None)?;
        Ok(Batch {
            windows: staged.windows.drain(..n).collect(),
            category_ids: self
                .kinds
                .category
                .then(|| staged.category_ids.drain(..n).collect()),
            conditioning: self
                .kinds
                .conditioning_channels
                .map(|_| staged.conditioning.drain(..n).collect()),
        })
    }
}

/// Zero-pad variable-length windows into one row-major `[n, max_len]` buffer.
pub fn pad_windows(windows: &[Vec<f32>]) -> (Vec<f32>, usize) {
    let max_len = windows.iter().map(Vec::len).max().unwrap_or(0);
    let mut data = vec![0.0f32; windows.len() * max_len];
    for (row, w) in data.chunks_exact_mut(max_len.max(1)).zip(windows) {
        row[..w.len()].copy_from_slice(w);
    }
    (data, max_len)
}
