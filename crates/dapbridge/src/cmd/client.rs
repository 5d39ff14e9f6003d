use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use dapbridge_frame::{FrameReader, FrameWriter, PacketType};
use dapbridge_transport::{TcpConnection, TransportError};

use crate::exit::{frame_error, transport_error, CliError, CliResult, TIMEOUT, USAGE};

/// Blocking host-side connection to a probe.
pub struct ProbeClient {
    conn: TcpConnection,
    peer: SocketAddr,
    writer: FrameWriter,
}

impl ProbeClient {
    /// Connect, retrying refused connections until `timeout` elapses.
    pub fn connect(target: &str, timeout: Duration) -> CliResult<Self> {
        let peer = resolve(target)?;
        let start = Instant::now();
        let conn = loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            match TcpConnection::connect(peer, Some(remaining.max(Duration::from_millis(1)))) {
                Ok(conn) => break conn,
                Err(TransportError::Connect { source, .. })
                    if source.kind() == ErrorKind::ConnectionRefused
                        && start.elapsed() < timeout =>
                {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(TransportError::Connect { source, .. })
                    if source.kind() == ErrorKind::ConnectionRefused =>
                {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect to {peer} timed out after {timeout:?}: {source}"),
                    ));
                }
                Err(err) => return Err(transport_error("connect failed", err)),
            }
        };

        conn.set_read_timeout(Some(timeout))
            .and_then(|()| conn.set_write_timeout(Some(timeout)))
            .and_then(|()| conn.set_nodelay(true))
            .map_err(|err| transport_error("socket setup failed", err))?;

        tracing::debug!(%peer, "connected to probe");
        Ok(Self {
            conn,
            peer,
            writer: FrameWriter::requests(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one request and wait for its response.
    pub fn exchange(&mut self, request: &[u8]) -> CliResult<Vec<u8>> {
        self.writer
            .send_frame(&mut self.conn, request)
            .map_err(|err| frame_error("send failed", err))?;
        FrameReader::new(&mut self.conn, PacketType::Response)
            .read_frame()
            .map(|frame| frame.payload.to_vec())
            .map_err(|err| frame_error("receive failed", err))
    }
}

fn resolve(target: &str) -> CliResult<SocketAddr> {
    target
        .to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {target:?}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {target:?} did not resolve")))
}
