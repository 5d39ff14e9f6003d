use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::{Result, TransportError};
use crate::stream::TcpConnection;
use crate::sys::{check, raw_sockaddr, setsockopt_int};

/// Non-blocking TCP listener sized for a single client.
///
/// The socket is created by hand rather than through `TcpListener::bind` so
/// the listen backlog can be pinned to one pending connection.
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Listen backlog: room for exactly one connection waiting to be accepted.
    pub const BACKLOG: libc::c_int = 1;

    /// Create, bind and listen on `addr`, leaving the socket non-blocking.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let domain = match addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let ty = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let ty = libc::SOCK_STREAM;

        // SAFETY: plain socket(2) call with constant arguments.
        let raw = check(unsafe { libc::socket(domain, ty, 0) }).map_err(|source| {
            TransportError::Socket {
                op: "socket",
                source,
            }
        })?;
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // Allow an immediate rebind after a restart while old connections linger in TIME_WAIT.
        setsockopt_int(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_REUSEADDR, 1).map_err(
            |source| TransportError::Socket {
                op: "SO_REUSEADDR",
                source,
            },
        )?;

        let (storage, len) = raw_sockaddr(&addr);
        // SAFETY: `storage` holds a valid socket address of `len` bytes.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
                len,
            )
        };
        check(rc).map_err(|source| TransportError::Bind { addr, source })?;

        // SAFETY: `fd` is a bound stream socket.
        check(unsafe { libc::listen(fd.as_raw_fd(), Self::BACKLOG) }).map_err(|source| {
            TransportError::Socket {
                op: "listen",
                source,
            }
        })?;

        let listener = TcpListener::from(fd);
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Socket {
                op: "set_nonblocking",
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Socket {
                op: "getsockname",
                source,
            })?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one pending connection without blocking.
    ///
    /// Returns `Ok(None)` when nobody is waiting. The accepted stream's
    /// blocking mode is platform dependent; callers set it explicitly.
    pub fn accept(&self) -> Result<Option<(TcpConnection, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => return Ok(Some((TcpConnection::from_std(stream), addr))),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
