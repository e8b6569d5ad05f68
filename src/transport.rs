//! Blocking TCP transport for the benchmark protocol.
//!
//! One [`Connection`] owns one OS socket for its lifetime; the handle is
//! released on every exit path by ownership. Scalars cross the wire as
//! explicit little-endian fixed-width integers rather than whatever the
//! native in-memory representation happens to be, so both peers agree on
//! the layout regardless of platform.

use crate::error::BenchError;
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tracing::{debug, warn};

/// A connected duplex byte stream.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    /// Connects to `host:port`, trying each resolved address in order and
    /// returning the first stream that succeeds.
    pub fn connect(host: &str, port: u16) -> Result<Self, BenchError> {
        let addrs = (host, port).to_socket_addrs().map_err(|e| {
            BenchError::Connect(format!("failed to resolve {}:{}: {}", host, port, e))
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    debug!(%addr, "connected");
                    return Self::from_stream(stream);
                }
                Err(e) => {
                    warn!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(BenchError::Connect(match last_error {
            Some(e) => format!("unable to connect to {}:{}: {}", host, port, e),
            None => format!("no addresses resolved for {}:{}", host, port),
        }))
    }

    pub(crate) fn from_stream(stream: TcpStream) -> Result<Self, BenchError> {
        SockRef::from(&stream)
            .set_nodelay(true)
            .map_err(|e| BenchError::Network(format!("failed to set TCP_NODELAY: {}", e)))?;
        Ok(Self { stream })
    }

    /// Sends with single underlying call semantics: the transport may accept
    /// fewer bytes than offered and the caller loops.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    pub fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    /// Receives with single underlying call semantics; a zero return means
    /// the peer closed its write direction.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Looped receive for fixed-size fields.
    pub fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(buf)
    }

    pub fn send_u32(&mut self, value: u32) -> io::Result<()> {
        self.stream.write_all(&value.to_le_bytes())
    }

    pub fn recv_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn send_i64(&mut self, value: i64) -> io::Result<()> {
        self.stream.write_all(&value.to_le_bytes())
    }

    pub fn recv_i64(&mut self) -> io::Result<i64> {
        let mut buf = [0u8; 8];
        self.stream.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Waits up to `timeout` for the socket to become readable. Returns
    /// `Ok(false)` on expiry without error.
    pub fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.poll(libc::POLLIN, timeout)
    }

    /// Waits up to `timeout` for the socket to become writable.
    pub fn poll_writable(&self, timeout: Duration) -> io::Result<bool> {
        self.poll(libc::POLLOUT, timeout)
    }

    fn poll(&self, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.stream.as_raw_fd(),
            events,
            revents: 0,
        };
        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        loop {
            let rc = unsafe { libc::poll(&mut fds, 1, millis) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            // Error conditions (POLLERR, POLLHUP) also count as ready so the
            // next send/recv surfaces the failure instead of spinning here.
            return Ok(rc > 0 && fds.revents != 0);
        }
    }

    /// Arms a socket-level send deadline; `0` clears it.
    pub fn set_send_timeout(&self, millis: u32) -> io::Result<()> {
        self.stream.set_write_timeout(timeout_from_millis(millis))
    }

    /// Arms a socket-level receive deadline; `0` clears it.
    pub fn set_recv_timeout(&self, millis: u32) -> io::Result<()> {
        self.stream.set_read_timeout(timeout_from_millis(millis))
    }

    /// Half-closes the send direction, signalling end-of-stream to the peer.
    pub fn shutdown_write(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    /// Reads and discards until the peer's orderly close; returns the number
    /// of bytes drained.
    pub fn drain(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 1024];
        let mut total = 0u64;
        loop {
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}

fn timeout_from_millis(millis: u32) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(u64::from(millis)))
    }
}

/// Listening socket that yields exactly one [`Connection`] per accept.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn bind(port: u16) -> Result<Self, BenchError> {
        let inner = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| BenchError::Connect(format!("failed to bind port {}: {}", port, e)))?;
        Ok(Self { inner })
    }

    /// Port actually bound; useful when binding port 0.
    pub fn local_port(&self) -> Result<u16, BenchError> {
        Ok(self
            .inner
            .local_addr()
            .map_err(|e| BenchError::Connect(format!("local_addr failed: {}", e)))?
            .port())
    }

    pub fn accept(&self) -> Result<Connection, BenchError> {
        let (stream, peer) = self
            .inner
            .accept()
            .map_err(|e| BenchError::Connect(format!("accept failed: {}", e)))?;
        debug!(%peer, "peer connected");
        Connection::from_stream(stream)
    }
}
