//! Receiver engine: the server role of the benchmark.
//!
//! Mirror of the sender with the I/O direction reversed: accepts the
//! handshake, then per round reads the header, opens a fresh output file
//! named from the round index and the announced base name, and runs the
//! identical round state machine gated on readability. Received spans are
//! appended to the output file immediately. Elapsed time per round feeds the
//! experiment report, which is written once after all tries complete.

use crate::config::{ServerConfig, DEFAULT_RECV_TIMEOUT_MS};
use crate::error::BenchError;
use crate::report::ExperimentReport;
use crate::round::{self, AttemptResult, ChunkIo, ErrorPolicy, Gate};
use crate::transport::{Connection, Listener};
use crate::wire::{self, RoundSpec, SessionConfig};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Readability-gated chunk sink: reads from the peer, appends to the output
/// file.
struct RecvChunks<'a> {
    conn: &'a mut Connection,
    out: File,
    buf: Vec<u8>,
}

impl<'a> RecvChunks<'a> {
    fn new(conn: &'a mut Connection, out: File, package_size: u32) -> Self {
        Self {
            conn,
            out,
            buf: vec![0u8; package_size as usize],
        }
    }
}

impl ChunkIo for RecvChunks<'_> {
    fn ready(&mut self, timeout: Duration) -> io::Result<bool> {
        self.conn.poll_readable(timeout)
    }

    fn transfer(&mut self, max_len: usize) -> io::Result<usize> {
        let n = self.conn.recv(&mut self.buf[..max_len])?;
        if n > 0 {
            self.out.write_all(&self.buf[..n])?;
        }
        Ok(n)
    }
}

/// Drives the whole server-side experiment over one connection.
pub struct Receiver {
    config: ServerConfig,
}

impl Receiver {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<(), BenchError> {
        std::fs::create_dir_all(&self.config.output_directory)?;

        let listener = Listener::bind(self.config.server_port)?;
        info!(port = self.config.server_port, "listening");

        let mut conn = listener.accept()?;
        // One logical stream per run; the listening socket is done.
        drop(listener);

        self.serve(&mut conn)
    }

    /// Runs the experiment over an already-accepted connection.
    pub fn serve(&self, conn: &mut Connection) -> Result<(), BenchError> {
        let session = wire::recv_handshake(conn)?;
        let tries = conn.recv_u32()?.max(1);

        info!(
            rounds = session.timeouts,
            package_size = session.package_size,
            file = %session.file_name,
            maximum_errors = session.maximum_errors,
            tries,
            "session negotiated"
        );

        // Output names come from the announced base name only; path
        // components from the peer are not trusted.
        let base_name = sanitize_file_name(&session.file_name);
        let output_dir = PathBuf::from(&self.config.output_directory);

        // Header reads between rounds stay bounded so a dead peer cannot
        // hang the run.
        conn.set_recv_timeout(DEFAULT_RECV_TIMEOUT_MS)?;

        let mut report = ExperimentReport::new(session.timeouts);

        'trials: for trial in 0..tries {
            for index in 0..session.timeouts as usize {
                let spec = match wire::recv_round_header(conn) {
                    Ok(Some(spec)) => spec,
                    Ok(None) => {
                        info!(trial, round = index, "peer closed the stream; ending experiment early");
                        break 'trials;
                    }
                    Err(e) => {
                        warn!(trial, round = index, error = %e, "failed to read round header");
                        break 'trials;
                    }
                };

                let out_path = output_dir.join(format!("out_{}_{}", index, base_name));
                let result = self.recv_round(conn, &spec, &session, &out_path, trial, index)?;

                report.record(index, spec.timeout_ms, result.elapsed_micros);

                info!(
                    trial,
                    round = index,
                    received = result.bytes_transferred,
                    errors = result.error_count,
                    max_streak = result.max_error_streak,
                    success = result.success,
                    elapsed_micros = result.elapsed_micros,
                    "round finished"
                );

                if !result.success {
                    warn!(trial, round = index, "round aborted; skipping remaining rounds of this trial");
                    break;
                }
            }
        }

        let csv_path = output_dir.join(format!("{}.csv", base_name));
        report.write_csv(&csv_path, tries)?;

        conn.shutdown_write()
            .map_err(|e| BenchError::Network(format!("shutdown failed: {}", e)))?;
        Ok(())
    }

    /// Receives one round into `out_path`. A file-create failure is fatal
    /// for the process; any transfer-level failure is absorbed into the
    /// returned result.
    fn recv_round(
        &self,
        conn: &mut Connection,
        spec: &RoundSpec,
        session: &SessionConfig,
        out_path: &Path,
        trial: u32,
        index: usize,
    ) -> Result<AttemptResult, BenchError> {
        let out = File::create(out_path)?;

        info!(
            trial,
            round = index,
            out = %out_path.display(),
            file_size = spec.file_size,
            timeout_ms = spec.timeout_ms,
            "receiving file"
        );

        // The peer's streak policy applies on this side too, so a sender
        // that aborted mid-round is detected instead of blocking forever.
        let policy = ErrorPolicy::from_maximum_errors(session.maximum_errors);
        let gate = Gate::for_round(self.config.apply_select_timeout, policy, spec.timeout_ms);

        if self.config.apply_socket_timeout {
            conn.set_recv_timeout(spec.timeout_ms)?;
        }

        let mut io = RecvChunks::new(conn, out, session.package_size);
        let result = round::run_round(&mut io, spec.file_size, session.package_size, gate, policy);

        if self.config.apply_socket_timeout {
            conn.set_recv_timeout(DEFAULT_RECV_TIMEOUT_MS)?;
        }

        Ok(result)
    }
}

/// Strips any path components from the announced file name.
fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "out.dat".to_string())
}
