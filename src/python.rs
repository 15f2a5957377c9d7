//! Python bindings for the training-loop side of the reader.
//!
//! Batches come back as owned NumPy arrays; variable-length windows and
//! embeddings are zero-padded to the longest element of the batch.

use crate::config::ReaderConfig;
use crate::queue::{QueueError, pad_windows};
use crate::reader::{AudioReader, ReaderError};

use numpy::{PyArray1, PyArray2, PyArray3, PyArrayMethods};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::types::{PyModule, PyModuleMethods};
use pyo3::{Bound, PyErr, PyResult, Python, pyclass, pymethods, pymodule};
use std::path::PathBuf;
use std::time::Duration;

fn reader_err(e: ReaderError) -> PyErr {
    match e {
        ReaderError::Spawn(_) | ReaderError::AlreadyStarted => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn queue_err(e: QueueError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Run a timed pop until it succeeds, checking for Python signals (Ctrl-C)
/// between attempts. Partial progress stays staged in the queue.
fn pop_interruptible<T, F>(py: Python<'_>, pop: F) -> PyResult<T>
where
    T: Send,
    F: Fn() -> Result<T, QueueError> + Sync,
{
    loop {
        // Release GIL for blocking operation
        match py.detach(&pop) {
            Ok(value) => return Ok(value),
            Err(QueueError::Timeout) => py.check_signals()?,
            Err(e) => return Err(queue_err(e)),
        }
    }
}

#[pyclass(name = "AudioReader")]
pub struct PyAudioReader {
    inner: AudioReader,
}

#[pymethods]
impl PyAudioReader {
    #[new]
    #[pyo3(signature = (
        audio_dir,
        sample_rate = 16000,
        gc_enabled = false,
        lc_enabled = false,
        receptive_field = 5117,
        sample_size = None,
        silence_threshold = None,
        queue_size = 32,
        n_threads = 1,
        seed = 0,
        trim_tail_seconds = 5.0,
        extensions = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        audio_dir: PathBuf,
        sample_rate: u32,
        gc_enabled: bool,
        lc_enabled: bool,
        receptive_field: usize,
        sample_size: Option<usize>,
        silence_threshold: Option<f32>,
        queue_size: usize,
        n_threads: usize,
        seed: u64,
        trim_tail_seconds: f32,
        extensions: Option<Vec<String>>,
    ) -> PyResult<Self> {
        let defaults = ReaderConfig::default();
        let config = ReaderConfig {
            audio_dir,
            extensions: extensions.unwrap_or(defaults.extensions),
            sample_rate,
            category_conditioning: gc_enabled,
            local_conditioning: lc_enabled,
            receptive_field,
            sample_size,
            silence_threshold,
            queue_capacity: queue_size,
            thread_count: n_threads,
            seed,
            trim_tail_seconds,
            ..defaults
        };
        let inner = AudioReader::new(config).map_err(reader_err)?;
        Ok(Self { inner })
    }

    #[pyo3(signature = (n_threads = None))]
    fn start_threads(&mut self, n_threads: Option<usize>) -> PyResult<()> {
        let n = n_threads.unwrap_or(self.inner.config().thread_count);
        self.inner.start_threads(n).map_err(reader_err)
    }

    /// Embedding table size when category conditioning is enabled.
    #[getter]
    fn category_cardinality(&self) -> Option<u32> {
        self.inner.category_cardinality()
    }

    /// `[num_elements, max_len]` float32 windows.
    fn dequeue<'py>(&self, py: Python<'py>, num_elements: usize) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let windows = pop_interruptible(py, || self.inner.dequeue_timeout(num_elements, POP_TIMEOUT))?;
        let (data, max_len) = pad_windows(&windows);
        PyArray1::from_vec(py, data).reshape([windows.len(), max_len])
    }

    /// `[num_elements]` int64 category ids.
    fn dequeue_category<'py>(&self, py: Python<'py>, num_elements: usize) -> PyResult<Bound<'py, PyArray1<i64>>> {
        let ids = pop_interruptible(py, || self.inner.dequeue_category_timeout(num_elements, POP_TIMEOUT))?;
        Ok(PyArray1::from_vec(py, ids.into_iter().map(i64::from).collect()))
    }

    /// `[num_elements, max_frames, channels]` float32 pitch embeddings.
    fn dequeue_conditioning<'py>(
        &self,
        py: Python<'py>,
        num_elements: usize,
    ) -> PyResult<Bound<'py, PyArray3<f32>>> {
        let embs = pop_interruptible(py, || {
            self.inner.dequeue_conditioning_timeout(num_elements, POP_TIMEOUT)
        })?;

        let channels = embs.first().map_or(0, |e| e.n_channels);
        let max_frames = embs.iter().map(|e| e.n_frames).max().unwrap_or(0);
        let stride = max_frames * channels;
        let mut data = vec![0.0f32; embs.len() * stride];
        for (i, emb) in embs.iter().enumerate() {
            data[i * stride..i * stride + emb.data.len()].copy_from_slice(&emb.data);
        }
        PyArray1::from_vec(py, data).reshape([embs.len(), max_frames, channels])
    }

    /// Cancel and join producer threads.
    fn stop(&mut self, py: Python<'_>) {
        py.detach(|| self.inner.stop());
    }
}

/// Python module entry point.
#[pymodule]
fn audio_feeder(m: &Bound<'_, PyModule>) -> PyResult<()> {
    if let Err(e) = crate::logging::init() {
        eprintln!("audio_feeder: {e}");
    }
    m.add_class::<PyAudioReader>()?;
    Ok(())
}
