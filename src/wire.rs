//! Wire codec for the benchmark protocol.
//!
//! The session opens with a length-prefixed UTF-8 JSON handshake blob, then
//! a bare `number_of_tries` scalar. Each round is announced by a two-field
//! header (`timeout_ms`, `file_size`) followed by exactly `file_size` raw
//! payload bytes chunked at the negotiated package size. There is no
//! end-of-round marker; boundaries are implicit from the announced size, and
//! the session ends with the sender's orderly half-close.

use crate::error::BenchError;
use crate::transport::Connection;
use serde::{Deserialize, Serialize};

/// Upper bound on the handshake blob; anything larger is a protocol error.
pub const MAX_HANDSHAKE_LEN: u32 = 64 * 1024;

/// Upper bound on the negotiated chunk size. Both sides allocate one buffer
/// of this size per round, so the peer does not get to pick the allocation.
pub const MAX_PACKAGE_SIZE: u32 = 8 * 1024 * 1024;

/// Session parameters negotiated once per connection. The sender is
/// authoritative; the receiver only consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of rounds per trial.
    pub timeouts: u32,
    /// Chunk size in bytes.
    pub package_size: u32,
    /// Base name for the receiver's per-round output files.
    pub file_name: String,
    /// Consecutive-failure abort threshold; 0 disables streak tracking.
    /// Optional on the wire: a sender that omits it gets fail-fast mode.
    #[serde(default)]
    pub maximum_errors: u32,
}

/// Per-round announcement, sent immediately before the chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSpec {
    pub timeout_ms: u32,
    pub file_size: i64,
}

pub fn send_handshake(conn: &mut Connection, config: &SessionConfig) -> Result<(), BenchError> {
    let blob = serde_json::to_vec(config)?;
    conn.send_u32(blob.len() as u32)?;
    conn.send_all(&blob)?;
    Ok(())
}

/// Receives and validates the handshake blob. A missing or mistyped required
/// field is a fatal protocol error.
pub fn recv_handshake(conn: &mut Connection) -> Result<SessionConfig, BenchError> {
    let len = conn.recv_u32()?;
    if len == 0 || len > MAX_HANDSHAKE_LEN {
        return Err(BenchError::Protocol(format!(
            "handshake blob length {} out of range",
            len
        )));
    }

    let mut blob = vec![0u8; len as usize];
    conn.recv_exact(&mut blob)?;

    let config: SessionConfig = serde_json::from_slice(&blob)
        .map_err(|e| BenchError::Protocol(format!("malformed handshake: {}", e)))?;

    if config.timeouts == 0 {
        return Err(BenchError::Protocol(
            "handshake announced zero rounds".to_string(),
        ));
    }
    if config.package_size == 0 || config.package_size > MAX_PACKAGE_SIZE {
        return Err(BenchError::Protocol(format!(
            "handshake package size {} out of range",
            config.package_size
        )));
    }

    Ok(config)
}

pub fn send_round_header(conn: &mut Connection, spec: &RoundSpec) -> Result<(), BenchError> {
    conn.send_u32(spec.timeout_ms)?;
    conn.send_i64(spec.file_size)?;
    Ok(())
}

/// Reads the next round header. Returns `Ok(None)` when the peer has
/// half-closed at a header boundary, which is the orderly end of the
/// session; a close partway through a header is a protocol error.
pub fn recv_round_header(conn: &mut Connection) -> Result<Option<RoundSpec>, BenchError> {
    let timeout_ms = match recv_u32_or_close(conn)? {
        Some(value) => value,
        None => return Ok(None),
    };
    let file_size = conn.recv_i64().map_err(|e| {
        BenchError::Protocol(format!("connection closed inside round header: {}", e))
    })?;

    if file_size < 0 {
        return Err(BenchError::Protocol(format!(
            "negative file size {} in round header",
            file_size
        )));
    }

    Ok(Some(RoundSpec { timeout_ms, file_size }))
}

fn recv_u32_or_close(conn: &mut Connection) -> Result<Option<u32>, BenchError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = conn.recv(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(BenchError::Protocol(
                "connection closed inside round header".to_string(),
            ));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(buf)))
}
