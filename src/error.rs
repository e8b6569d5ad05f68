//! Error types for the Tempo benchmark.
//!
//! Errors are split along the lifecycle of a run: setup-phase failures
//! (configuration, connection establishment, handshake) abort the process,
//! while per-round transfer failures are absorbed into the round's result
//! and only surface as log lines.

use std::io;
use thiserror::Error;

/// Errors that can occur while driving a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// An I/O error occurred during file or network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize or deserialize JSON data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error (missing required field, malformed file, invalid value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to resolve, connect, bind, listen, or accept.
    #[error("Connection error: {0}")]
    Connect(String),

    /// A protocol-level error (malformed handshake, truncated header, bad length).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A network-level error outside the round loop (socket option setup, shutdown).
    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let bench_error: BenchError = io_error.into();

        match bench_error {
            BenchError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_error = serde_json::from_str::<i32>("not json").unwrap_err();
        let bench_error: BenchError = json_error.into();

        match bench_error {
            BenchError::Serialization(_) => {}
            _ => panic!("Expected Serialization error variant"),
        }
    }

    #[test]
    fn test_protocol_error_display() {
        let error = BenchError::Protocol("handshake blob length 0 out of range".to_string());
        assert!(error.to_string().contains("handshake blob length"));
    }

    #[test]
    fn test_config_error_display() {
        let error = BenchError::Config("package_size must be greater than zero".to_string());
        assert!(error.to_string().contains("package_size"));
    }
}
