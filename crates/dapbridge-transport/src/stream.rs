use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::keepalive::KeepaliveConfig;
use crate::sys::check;

/// Result of a non-consuming liveness probe on a connection.
#[derive(Debug)]
pub enum Liveness {
    /// The peer is still there (data pending, or nothing to read yet).
    Open,
    /// The peer performed an orderly close.
    Closed,
    /// The socket reported a hard error; treat the peer as gone.
    Failed(std::io::Error),
}

/// A connected TCP stream implementing Read + Write.
///
/// Wraps a `std::net::TcpStream` and adds the queries a non-blocking
/// reassembler needs: how many bytes are buffered, and a peek that never
/// consumes.
pub struct TcpConnection {
    stream: TcpStream,
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl TcpConnection {
    pub(crate) fn from_std(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to a listening server (blocking), as a host-side client would.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> Result<Self> {
        let stream = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected");
        Ok(Self::from_std(stream))
    }

    /// Number of received bytes buffered by the kernel and not yet consumed.
    pub fn available(&self) -> std::io::Result<usize> {
        let mut pending: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the provided pointer,
        // which points at a live local; the descriptor is owned by `self`.
        let rc = unsafe {
            libc::ioctl(
                self.stream.as_raw_fd(),
                libc::FIONREAD,
                &mut pending as *mut libc::c_int,
            )
        };
        check(rc)?;
        Ok(usize::try_from(pending).unwrap_or(0))
    }

    /// Copy up to `buf.len()` buffered bytes without consuming them.
    pub fn peek(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.peek(buf)
    }

    /// Non-blocking, non-consuming check of whether the peer is still there.
    ///
    /// Uses `MSG_DONTWAIT` so it never parks the thread, even if the socket
    /// itself was left in blocking mode.
    pub fn probe(&self) -> Liveness {
        let mut byte = 0u8;
        loop {
            // SAFETY: the buffer is one valid writable byte; the descriptor is
            // owned by `self` for the duration of the call.
            let rc = unsafe {
                libc::recv(
                    self.stream.as_raw_fd(),
                    (&mut byte as *mut u8).cast::<libc::c_void>(),
                    1,
                    libc::MSG_PEEK | libc::MSG_DONTWAIT,
                )
            };
            if rc > 0 {
                return Liveness::Open;
            }
            if rc == 0 {
                return Liveness::Closed;
            }

            let err = std::io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                // A receive timeout is not a verdict on the peer.
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::NotConnected => {
                    return Liveness::Open
                }
                _ => return Liveness::Failed(err),
            }
        }
    }

    /// Enable and tune TCP keepalive probing.
    pub fn configure_keepalive(&self, config: &KeepaliveConfig) -> Result<()> {
        config
            .apply(self.stream.as_raw_fd())
            .map_err(|source| TransportError::Socket {
                op: "keepalive",
                source,
            })
    }

    /// Switch the socket between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.stream
            .set_nonblocking(nonblocking)
            .map_err(|source| TransportError::Socket {
                op: "set_nonblocking",
                source,
            })
    }

    /// Disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Address of the remote end, if the socket still knows it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Shut down one or both halves of the connection.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        self.stream.shutdown(how).map_err(Into::into)
    }
}

impl AsRawFd for TcpConnection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer", &self.peer_addr())
            .finish()
    }
}
