//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; embedding processes (the Python
//! module, a training binary) call `init` once to print them to stderr.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt};

static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Another global subscriber was installed first.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(String),
}

/// Filter from `RUST_LOG`, falling back to `info`.
fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr fmt subscriber. Every call, concurrent ones included,
/// returns the outcome of the first install attempt.
pub fn init() -> Result<(), LoggingError> {
    INSTALLED
        .get_or_init(|| {
            fmt()
                .with_env_filter(build_env_filter())
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .try_init()
                .map_err(|e| e.to_string())?;
            tracing::debug!("logging initialized");
            Ok(())
        })
        .clone()
        .map_err(LoggingError::SetGlobal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_init_agrees() {
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| init().is_ok())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|&ok| ok == results[0]));
        assert_eq!(init().is_ok(), results[0]);
    }

    #[test]
    fn test_init_is_idempotent() {
        // The test harness may race other tests for the global slot; either
        // way a second call must not fail once the first succeeded.
        if init().is_ok() {
            assert!(init().is_ok());
        }
    }
}
