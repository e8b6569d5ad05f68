//! Configuration management for Tempo.
//!
//! Both peers load their configuration from a JSON file once at startup.
//! On a first run the file does not exist yet: defaults are written back and
//! the process exits cleanly so the operator can inspect and edit them. A
//! malformed *existing* file is a fatal error.

use crate::error::BenchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default config file name for the sending side.
pub const CLIENT_CONFIG_FILE: &str = "config_client.json";
/// Default config file name for the receiving side.
pub const SERVER_CONFIG_FILE: &str = "config_server.json";

/// Socket receive deadline the receiver falls back to between rounds, in
/// milliseconds. Bounds the header reads so a dead peer cannot hang the run.
pub const DEFAULT_RECV_TIMEOUT_MS: u32 = 30_000;

/// Configuration for the sending (client) side of the benchmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or address of the receiver.
    pub server_ip: String,
    pub server_port: u16,
    /// Maximum payload bytes per chunk.
    pub package_size: u32,
    /// Per-round timeout budgets in milliseconds, in experiment order.
    pub timeout: Vec<u32>,
    /// File whose bytes are streamed each round.
    pub file_name: String,
    /// Consecutive-failure abort threshold; 0 selects the fail-fast
    /// socket-timeout mode instead of streak tracking.
    pub maximum_errors: u32,
    /// Number of full passes over the timeout list, for averaging.
    pub number_of_tries: u32,
    /// When false, readiness polling is skipped and chunks are sent directly.
    pub apply_select_timeout: bool,
}

/// Configuration for the receiving (server) side of the benchmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_port: u16,
    /// Arm the round's timeout on the socket itself for the round's duration.
    pub apply_socket_timeout: bool,
    /// When false, readiness polling is skipped and chunks are read directly.
    pub apply_select_timeout: bool,
    /// Directory for per-round output files and the summary report.
    pub output_directory: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_ip: "localhost".to_string(),
            server_port: 9999,
            package_size: 16,
            timeout: vec![25, 50, 75],
            file_name: "in.dat".to_string(),
            maximum_errors: 10,
            number_of_tries: 1,
            apply_select_timeout: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 9999,
            apply_socket_timeout: true,
            apply_select_timeout: true,
            output_directory: ".".to_string(),
        }
    }
}

impl ClientConfig {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.package_size == 0 {
            return Err(BenchError::Config(
                "package_size must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_empty() {
            return Err(BenchError::Config(
                "timeout list must contain at least one value".to_string(),
            ));
        }
        if self.file_name.is_empty() {
            return Err(BenchError::Config("file_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Loads a configuration from `path`, or writes defaults there on first run.
///
/// Returns `Ok(None)` when the file was absent and defaults were generated;
/// the caller is expected to exit cleanly in that case. An existing file that
/// fails to parse is a fatal configuration error.
pub fn load_or_init<T>(path: &Path) -> Result<Option<T>, BenchError>
where
    T: Serialize + DeserializeOwned + Default,
{
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content).map_err(|e| {
            BenchError::Config(format!("malformed config {}: {}", path.display(), e))
        })?;
        Ok(Some(config))
    } else {
        let config = T::default();
        let content = serde_json::to_string_pretty(&config)?;
        fs::write(path, content)?;
        Ok(None)
    }
}
