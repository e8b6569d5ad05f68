//! Tempo - TCP file-transfer timing benchmark.
//!
//! Tempo measures file-transfer reliability and latency over a single TCP
//! connection under operator-chosen per-round timeout budgets, chunk
//! ("package") sizes, and repeated trials. The sender streams one file per
//! round in package-sized chunks gated on readiness polling or socket-level
//! deadlines; the receiver mirrors the loop, times each round, and writes a
//! two-row CSV report of averaged durations per timeout value.
//!
//! # Example
//!
//! ```no_run
//! use tempo::config::ServerConfig;
//! use tempo::receiver::Receiver;
//!
//! # fn main() -> Result<(), tempo::error::BenchError> {
//! let receiver = Receiver::new(ServerConfig::default());
//! receiver.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod receiver;
pub mod round;
pub mod sender;
pub mod smoke;
pub mod transport;
pub mod wire;

pub use config::{ClientConfig, ServerConfig};
pub use error::BenchError;
pub use report::ExperimentReport;
pub use round::{AttemptResult, ErrorPolicy, Gate};
pub use wire::{RoundSpec, SessionConfig};
