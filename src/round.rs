//! The per-round transfer state machine shared by both directions.
//!
//! A round moves exactly `file_size` bytes in chunks of at most
//! `package_size`, gating each chunk on readiness polling and accounting for
//! consecutive failures. The loop is written against the [`ChunkIo`] trait so
//! the sender (writability + file read + send) and the receiver (readability
//! + recv + file append) drive the identical machine, and so the streak
//! semantics are testable with a scripted fake.

use std::io;
use std::time::{Duration, Instant};
use tracing::warn;

/// Readiness gating applied before each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Poll for readiness up to `timeout` before each chunk.
    Select { timeout: Duration },
    /// Skip polling entirely; proceed straight to the transfer call.
    Immediate,
}

/// What to do when a chunk attempt does not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Count consecutive failures and retry the same chunk; abort once the
    /// streak reaches `maximum_errors`.
    Streak { maximum_errors: u32 },
    /// No retries: the first failure aborts the round. Callers pair this
    /// with a socket-level deadline so a blocked call fails instead of
    /// hanging.
    FailFast,
}

impl ErrorPolicy {
    /// `maximum_errors == 0` disables streak tracking.
    pub fn from_maximum_errors(maximum_errors: u32) -> Self {
        if maximum_errors == 0 {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::Streak { maximum_errors }
        }
    }
}

impl Gate {
    /// Selects the readiness gate for a round. Polling applies only when
    /// enabled by configuration and when streak tracking is on; fail-fast
    /// mode relies on the socket deadline alone and goes straight to the
    /// transfer call.
    pub fn for_round(apply_select_timeout: bool, policy: ErrorPolicy, timeout_ms: u32) -> Self {
        if apply_select_timeout && policy != ErrorPolicy::FailFast {
            Gate::Select {
                timeout: Duration::from_millis(u64::from(timeout_ms)),
            }
        } else {
            Gate::Immediate
        }
    }
}

/// Outcome of one round, produced locally by each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptResult {
    pub bytes_transferred: i64,
    pub error_count: u32,
    pub max_error_streak: u32,
    pub success: bool,
    pub elapsed_micros: i64,
}

/// One direction of the chunk loop.
pub trait ChunkIo {
    /// Readiness check bounded by `timeout`: writability for the sender,
    /// readability for the receiver. `Ok(false)` means the bound expired.
    fn ready(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Moves at most `max_len` bytes and returns the count actually moved by
    /// the underlying call. Zero means the stream ended before the announced
    /// size was reached.
    fn transfer(&mut self, max_len: usize) -> io::Result<usize>;
}

/// Runs one round to completion or abort and reports the attempt.
///
/// `bytes_transferred` advances by whatever the transport actually accepted,
/// never by the chunk length. Elapsed time covers entry to exit of the loop,
/// success or abort.
pub fn run_round(
    io: &mut dyn ChunkIo,
    file_size: i64,
    package_size: u32,
    gate: Gate,
    policy: ErrorPolicy,
) -> AttemptResult {
    let started = Instant::now();
    let mut result = AttemptResult::default();
    let mut streak = 0u32;
    let mut aborted = false;

    while result.bytes_transferred < file_size {
        let ready = match gate {
            Gate::Select { timeout } => match io.ready(timeout) {
                Ok(ready) => ready,
                Err(e) => {
                    warn!(error = %e, "readiness poll failed");
                    aborted = true;
                    break;
                }
            },
            Gate::Immediate => true,
        };

        if !ready {
            if record_failure(&mut result, &mut streak, policy) {
                aborted = true;
                break;
            }
            continue;
        }

        let remaining = (file_size - result.bytes_transferred) as usize;
        let max_len = remaining.min(package_size as usize);

        match io.transfer(max_len) {
            Ok(0) => {
                warn!(
                    transferred = result.bytes_transferred,
                    expected = file_size,
                    "stream ended before announced size"
                );
                aborted = true;
                break;
            }
            Ok(n) => {
                // The streak resets only once bytes actually move, so
                // consecutive deadline expiries keep accumulating even when
                // the gate reports ready every time.
                streak = 0;
                result.bytes_transferred += n as i64;
            }
            Err(e) if is_timeout(&e) && matches!(policy, ErrorPolicy::Streak { .. }) => {
                // A socket-deadline expiry is the same transient condition as
                // a failed readiness poll when streak tracking is on.
                if record_failure(&mut result, &mut streak, policy) {
                    aborted = true;
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "chunk transfer failed");
                result.error_count += 1;
                aborted = true;
                break;
            }
        }
    }

    result.success = !aborted && result.bytes_transferred == file_size;
    result.elapsed_micros = started.elapsed().as_micros() as i64;
    result
}

/// Returns true when the round must abort.
fn record_failure(result: &mut AttemptResult, streak: &mut u32, policy: ErrorPolicy) -> bool {
    match policy {
        ErrorPolicy::Streak { maximum_errors } => {
            result.error_count += 1;
            *streak += 1;
            result.max_error_streak = result.max_error_streak.max(*streak);
            *streak >= maximum_errors
        }
        ErrorPolicy::FailFast => true,
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
