use std::net::SocketAddr;

use dapbridge_transport::{KeepaliveConfig, Liveness, TcpConnection, TcpServer};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::link::FramedLink;

/// Descriptor for a client that just became the active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewConnection {
    /// Monotonic identifier, unique for the lifetime of the manager.
    pub id: u64,
    pub peer: SocketAddr,
}

/// The connected client and its framing state.
#[derive(Debug)]
pub struct ActiveConnection {
    id: u64,
    peer: SocketAddr,
    link: FramedLink<TcpConnection>,
}

impl ActiveConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn link(&self) -> &FramedLink<TcpConnection> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut FramedLink<TcpConnection> {
        &mut self.link
    }
}

/// Whether a client is currently being served.
#[derive(Debug)]
pub enum ConnectionState {
    Listening,
    Connected(ActiveConnection),
}

/// Owns the listening socket and at most one client connection.
///
/// A second client arriving while one is active is closed straight away.
/// Nothing here blocks.
#[derive(Debug)]
pub struct ConnectionManager {
    listener: TcpServer,
    keepalive: Option<KeepaliveConfig>,
    state: ConnectionState,
    next_id: u64,
    rejected: u64,
}

impl ConnectionManager {
    /// Bind and listen according to `config`.
    pub fn start(config: &ServerConfig) -> Result<Self> {
        let listener = TcpServer::bind(config.bind)?;
        Ok(Self {
            listener,
            keepalive: config.keepalive,
            state: ConnectionState::Listening,
            next_id: 1,
            rejected: 0,
        })
    }

    /// Accept one waiting client, if any.
    ///
    /// Returns `Ok(None)` when nobody is waiting and also when a client was
    /// turned away because another one is active; the latter is logged and
    /// counted by [`rejected_count`](Self::rejected_count).
    pub fn accept_if_pending(&mut self) -> Result<Option<NewConnection>> {
        let Some((stream, peer)) = self.listener.accept()? else {
            return Ok(None);
        };

        if let ConnectionState::Connected(active) = &self.state {
            warn!(
                %peer,
                active_peer = %active.peer,
                connection_id = active.id,
                "rejecting connection: a client is already connected"
            );
            self.rejected += 1;
            drop(stream);
            return Ok(None);
        }

        if let Some(keepalive) = &self.keepalive {
            if let Err(err) = stream.configure_keepalive(keepalive) {
                warn!(%peer, error = %err, "could not enable TCP keepalive");
            }
        }
        stream.set_nonblocking(true)?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = %err, "could not disable Nagle's algorithm");
        }

        let id = self.next_id;
        self.next_id += 1;
        info!(connection_id = id, %peer, "client connected");

        self.state = ConnectionState::Connected(ActiveConnection {
            id,
            peer,
            link: FramedLink::new(stream),
        });
        Ok(Some(NewConnection { id, peer }))
    }

    /// Non-consuming check for a client that has gone away.
    ///
    /// Returns `false` when no client is connected.
    pub fn check_disconnected(&self) -> bool {
        let ConnectionState::Connected(active) = &self.state else {
            return false;
        };
        match active.link.get_ref().probe() {
            Liveness::Open => false,
            Liveness::Closed => true,
            Liveness::Failed(err) => {
                debug!(connection_id = active.id, error = %err, "liveness probe failed");
                true
            }
        }
    }

    /// Drop the active client, if any, and go back to listening.
    pub fn close(&mut self) {
        if let ConnectionState::Connected(active) =
            std::mem::replace(&mut self.state, ConnectionState::Listening)
        {
            info!(connection_id = active.id, peer = %active.peer, "client disconnected");
        }
    }

    /// Bytes buffered on the active connection; zero when there is none.
    pub fn bytes_available(&mut self) -> usize {
        self.active_mut()
            .map_or(0, |active| active.link.bytes_available())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveConnection> {
        match &self.state {
            ConnectionState::Connected(active) => Some(active),
            ConnectionState::Listening => None,
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveConnection> {
        match &mut self.state {
            ConnectionState::Connected(active) => Some(active),
            ConnectionState::Listening => None,
        }
    }

    /// Number of clients turned away since start.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}
