//! Raw byte relay between one TCP client and a character device, for
//! reaching a target's serial console next to the debug link.
//!
//! There is no framing here. Connect with something like
//! `socat TCP:probe:4442 PTY,link=/tmp/tty_target,raw,echo=0`.

use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;

use dapbridge_transport::{KeepaliveConfig, TcpConnection, TcpServer};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Bytes moved per direction per tick.
pub const CONSOLE_CHUNK: usize = 512;

/// What one call to [`ConsoleBridge::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleReport {
    pub accepted: bool,
    pub rejected: bool,
    /// Bytes written to the device.
    pub to_device: usize,
    /// Bytes written to the client.
    pub to_client: usize,
    pub closed: bool,
}

impl ConsoleReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

struct ConsoleClient {
    stream: TcpConnection,
    peer: SocketAddr,
}

/// Single-client TCP ⇄ device relay.
///
/// The device should be opened non-blocking; a device read that would block
/// simply moves nothing this tick. Device output is only read while a client
/// is connected.
pub struct ConsoleBridge<D> {
    listener: TcpServer,
    keepalive: Option<KeepaliveConfig>,
    device: D,
    client: Option<ConsoleClient>,
    buf: [u8; CONSOLE_CHUNK],
}

impl<D: Read + Write> ConsoleBridge<D> {
    pub fn start(bind: SocketAddr, keepalive: Option<KeepaliveConfig>, device: D) -> Result<Self> {
        let listener = TcpServer::bind(bind)?;
        info!(addr = %listener.local_addr(), "console bridge started");
        Ok(Self {
            listener,
            keepalive,
            device,
            client: None,
            buf: [0u8; CONSOLE_CHUNK],
        })
    }

    pub fn tick(&mut self) -> ConsoleReport {
        let mut report = ConsoleReport::default();
        self.accept(&mut report);

        if self.client.is_some() {
            self.client_to_device(&mut report);
        }
        if self.client.is_some() {
            self.device_to_client(&mut report);
        }
        report
    }

    fn accept(&mut self, report: &mut ConsoleReport) {
        let (stream, peer) = match self.listener.accept() {
            Ok(Some(accepted)) => accepted,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "console accept failed");
                return;
            }
        };

        if let Some(active) = &self.client {
            warn!(
                %peer,
                active_peer = %active.peer,
                "rejecting console connection: a client is already connected"
            );
            report.rejected = true;
            return;
        }

        if let Some(keepalive) = &self.keepalive {
            if let Err(err) = stream.configure_keepalive(keepalive) {
                warn!(%peer, error = %err, "could not enable TCP keepalive on console client");
            }
        }
        if let Err(err) = stream.set_nonblocking(true) {
            warn!(%peer, error = %err, "dropping console client");
            return;
        }

        info!(%peer, "console client connected");
        self.client = Some(ConsoleClient { stream, peer });
        report.accepted = true;
    }

    fn client_to_device(&mut self, report: &mut ConsoleReport) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let n = match client.stream.read(&mut self.buf) {
            Ok(0) => {
                self.disconnect(report);
                return;
            }
            Ok(n) => n,
            Err(err) if is_transient(&err) => return,
            Err(err) if is_disconnect(&err) => {
                debug!(error = %err, "console client read failed");
                self.disconnect(report);
                return;
            }
            Err(err) => {
                warn!(error = %err, "console client read error");
                return;
            }
        };

        report.to_device += relay(&mut self.device, &self.buf[..n], "device");
    }

    fn device_to_client(&mut self, report: &mut ConsoleReport) {
        let n = match self.device.read(&mut self.buf) {
            Ok(n) => n,
            Err(err) if is_transient(&err) => return,
            Err(err) => {
                warn!(error = %err, "console device read error");
                return;
            }
        };
        if n == 0 {
            return;
        }

        let Some(client) = self.client.as_mut() else {
            return;
        };
        match write_some(&mut client.stream, &self.buf[..n]) {
            Ok(written) => {
                if written < n {
                    debug!(dropped = n - written, "console client not keeping up");
                }
                report.to_client += written;
            }
            Err(err) if is_disconnect(&err) => {
                debug!(error = %err, "console client write failed");
                self.disconnect(report);
            }
            Err(err) => warn!(error = %err, "console client write error"),
        }
    }

    fn disconnect(&mut self, report: &mut ConsoleReport) {
        if let Some(client) = self.client.take() {
            info!(peer = %client.peer, "console client disconnected");
            report.closed = true;
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D> std::fmt::Debug for ConsoleBridge<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleBridge")
            .field("listener", &self.listener)
            .field("client", &self.client.as_ref().map(|c| c.peer))
            .finish_non_exhaustive()
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
    )
}

/// Write as much of `buf` as the sink takes without blocking.
fn write_some<W: Write + ?Sized>(sink: &mut W, buf: &[u8]) -> std::io::Result<usize> {
    let mut written = 0usize;
    while written < buf.len() {
        match sink.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(err) => return Err(err),
        }
    }
    Ok(written)
}

fn relay<W: Write + ?Sized>(sink: &mut W, buf: &[u8], what: &'static str) -> usize {
    match write_some(sink, buf) {
        Ok(written) => {
            if written < buf.len() {
                debug!(dropped = buf.len() - written, sink = what, "short console write");
            }
            written
        }
        Err(err) => {
            warn!(error = %err, sink = what, "console write error");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::{Shutdown, TcpStream};
    use std::time::{Duration, Instant};

    use super::*;

    /// Stand-in for a non-blocking TTY.
    #[derive(Default)]
    struct FakeTty {
        output: VecDeque<u8>,
        input: Vec<u8>,
    }

    impl Read for FakeTty {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.output.is_empty() {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.output.len());
            for slot in &mut buf[..n] {
                *slot = self.output.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakeTty {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.input.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn bridge() -> ConsoleBridge<FakeTty> {
        ConsoleBridge::start("127.0.0.1:0".parse().unwrap(), None, FakeTty::default())
            .expect("bridge should start")
    }

    fn tick_until(
        bridge: &mut ConsoleBridge<FakeTty>,
        mut cond: impl FnMut(&ConsoleBridge<FakeTty>, &ConsoleReport) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let report = bridge.tick();
            if cond(bridge, &report) {
                return;
            }
            assert!(Instant::now() < deadline, "condition not met");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn relays_both_directions() {
        let mut bridge = bridge();
        let mut client = TcpStream::connect(bridge.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        tick_until(&mut bridge, |b, _| b.is_connected());

        client.write_all(b"help\r\n").unwrap();
        tick_until(&mut bridge, |b, _| b.device().input == b"help\r\n");

        bridge.device_mut().output.extend(b"> ".iter().copied());
        tick_until(&mut bridge, |_, r| r.to_client == 2);

        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"> ");
    }

    #[test]
    fn moves_at_most_one_chunk_per_tick() {
        let mut bridge = bridge();
        let _client = TcpStream::connect(bridge.local_addr()).unwrap();
        tick_until(&mut bridge, |b, _| b.is_connected());

        bridge
            .device_mut()
            .output
            .extend(std::iter::repeat(b'x').take(CONSOLE_CHUNK + 10));
        let report = bridge.tick();
        assert_eq!(report.to_client, CONSOLE_CHUNK);
        assert_eq!(bridge.device().output.len(), 10);
    }

    #[test]
    fn device_is_not_read_without_a_client() {
        let mut bridge = bridge();
        bridge.device_mut().output.extend(b"boot".iter().copied());
        assert!(bridge.tick().is_idle());
        assert_eq!(bridge.device().output.len(), 4);
    }

    #[test]
    fn second_client_rejected_and_close_detected() {
        let mut bridge = bridge();
        let first = TcpStream::connect(bridge.local_addr()).unwrap();
        tick_until(&mut bridge, |b, _| b.is_connected());

        let mut second = TcpStream::connect(bridge.local_addr()).unwrap();
        tick_until(&mut bridge, |_, r| r.rejected);
        second
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(second.read(&mut buf).unwrap(), 0);

        first.shutdown(Shutdown::Write).unwrap();
        tick_until(&mut bridge, |_, r| r.closed);
        assert!(!bridge.is_connected());
    }
}
