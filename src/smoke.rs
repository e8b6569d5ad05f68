//! Raw-throughput smoke test.
//!
//! Spins up a loopback sender/receiver pair on independent OS threads with
//! no protocol framing: fixed-size sends and receives under socket-level
//! timeouts, per-call timing, and consecutive-error accounting with a large
//! abort threshold. Useful for eyeballing raw socket behavior under
//! deadlines before running the framed benchmark.

use crate::error::BenchError;
use crate::transport::{Connection, Listener};
use std::thread;
use std::time::Instant;
use tracing::info;

/// Abort threshold for consecutive failed calls on either side.
const MAX_CONSECUTIVE_ERRORS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct SmokeConfig {
    pub port: u16,
    /// Number of message-sized calls each side attempts.
    pub count: u64,
    pub message_len: usize,
    /// Socket-level deadline armed on both directions, in milliseconds.
    pub timeout_ms: u32,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            count: 100_000,
            message_len: 16,
            timeout_ms: 25,
        }
    }
}

#[derive(Debug, Default)]
struct CallStats {
    bytes: u64,
    errors: u64,
    max_error_streak: u64,
    sum_micros: u64,
    min_micros: u64,
    max_micros: u64,
    calls: u64,
}

impl CallStats {
    fn new() -> Self {
        Self {
            min_micros: u64::MAX,
            ..Self::default()
        }
    }

    fn record_call(&mut self, micros: u64) {
        self.calls += 1;
        self.sum_micros += micros;
        self.min_micros = self.min_micros.min(micros);
        self.max_micros = self.max_micros.max(micros);
    }

    fn avg_micros(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.sum_micros / self.calls
        }
    }
}

/// Runs the smoke test to completion and logs both sides' statistics.
pub fn run(config: &SmokeConfig) -> Result<(), BenchError> {
    let listener = Listener::bind(config.port)?;
    let port = listener.local_port()?;
    info!(port, count = config.count, "smoke test starting");

    let recv_config = config.clone();
    let recv_thread = thread::spawn(move || -> Result<CallStats, BenchError> {
        let mut conn = listener.accept()?;
        conn.set_recv_timeout(recv_config.timeout_ms)?;

        let mut stats = CallStats::new();
        let mut buf = vec![0u8; recv_config.message_len];
        let mut streak = 0u64;
        let started = Instant::now();

        let mut received_calls = 0u64;
        while received_calls < recv_config.count {
            match conn.recv(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    stats.bytes += n as u64;
                    received_calls += 1;
                    streak = 0;
                }
                Err(_) => {
                    stats.errors += 1;
                    streak += 1;
                    stats.max_error_streak = stats.max_error_streak.max(streak);
                    if streak >= MAX_CONSECUTIVE_ERRORS {
                        break;
                    }
                }
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = stats.bytes,
            errors = stats.errors,
            "recv side finished"
        );
        Ok(stats)
    });

    let mut conn = Connection::connect("127.0.0.1", port)?;
    conn.set_send_timeout(config.timeout_ms)?;
    conn.set_recv_timeout(config.timeout_ms)?;

    let mut stats = CallStats::new();
    let message = vec![0u8; config.message_len];
    let mut streak = 0u64;
    let started = Instant::now();

    for _ in 0..config.count {
        let call_start = Instant::now();
        let outcome = conn.send(&message);
        stats.record_call(call_start.elapsed().as_micros() as u64);

        match outcome {
            Ok(n) => {
                stats.bytes += n as u64;
                streak = 0;
            }
            Err(_) => {
                stats.errors += 1;
                streak += 1;
                stats.max_error_streak = stats.max_error_streak.max(streak);
                if streak >= MAX_CONSECUTIVE_ERRORS {
                    break;
                }
            }
        }
    }

    conn.shutdown_write()
        .map_err(|e| BenchError::Network(format!("shutdown failed: {}", e)))?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        bytes = stats.bytes,
        errors = stats.errors,
        max_error_streak = stats.max_error_streak,
        avg_micros = stats.avg_micros(),
        min_micros = stats.min_micros,
        max_micros = stats.max_micros,
        "send side finished"
    );

    let recv_stats = recv_thread
        .join()
        .map_err(|_| BenchError::Network("receiver thread panicked".to_string()))??;

    info!(
        sent = stats.bytes,
        received = recv_stats.bytes,
        recv_errors = recv_stats.errors,
        "smoke test done"
    );
    Ok(())
}
