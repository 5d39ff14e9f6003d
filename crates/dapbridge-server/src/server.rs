use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::processor::CommandProcessor;
use crate::pump::RequestPump;

/// What one call to [`DapServer::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A new client became active.
    pub accepted: bool,
    /// A client was turned away because another one is active.
    pub rejected: bool,
    /// Request/response exchanges completed.
    pub exchanges: usize,
    /// The active client was dropped.
    pub closed: bool,
}

impl TickReport {
    /// Whether the tick found nothing to do.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Single-client CMSIS-DAP over TCP server.
///
/// Drive it by calling [`tick`](Self::tick) from a loop. A tick never
/// blocks: it accepts a waiting client, notices a departed one, and answers
/// every complete request that has arrived.
#[derive(Debug)]
pub struct DapServer<P> {
    config: ServerConfig,
    manager: ConnectionManager,
    pump: RequestPump,
    processor: P,
    protocol_errors: u32,
}

impl<P: CommandProcessor> DapServer<P> {
    /// Bind the listener. Fails if the address cannot be bound.
    pub fn start(config: ServerConfig, processor: P) -> Result<Self> {
        let manager = ConnectionManager::start(&config)?;
        info!(
            addr = %manager.local_addr(),
            max_protocol_errors = config.max_protocol_errors,
            keepalive_window = ?config.keepalive.map(|k| k.detection_window()),
            "CMSIS-DAP server started"
        );
        Ok(Self {
            config,
            manager,
            pump: RequestPump::new(),
            processor,
            protocol_errors: 0,
        })
    }

    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let rejected_before = self.manager.rejected_count();
        match self.manager.accept_if_pending() {
            Ok(Some(_)) => {
                report.accepted = true;
                self.protocol_errors = 0;
            }
            Ok(None) => {}
            Err(err) => error!(error = %err, "failed to accept client"),
        }
        report.rejected = self.manager.rejected_count() != rejected_before;

        if self.manager.check_disconnected() {
            self.manager.close();
            report.closed = true;
            return report;
        }

        let Some(active) = self.manager.active_mut() else {
            return report;
        };
        let connection_id = active.id();

        let mut drop_client = false;
        loop {
            let before = self.pump.exchanges();
            let result = self.pump.service(active.link_mut(), &mut self.processor);
            let done = (self.pump.exchanges() - before) as usize;
            report.exchanges += done;
            if done > 0 {
                self.protocol_errors = 0;
            }

            let err = match result {
                Ok(_) => break,
                Err(err) => err,
            };

            if err.is_peer_closed() {
                debug!(connection_id, "peer closed mid-frame");
                drop_client = true;
                break;
            }
            if err.is_connection_fatal() {
                warn!(connection_id, error = %err, "dropping client");
                drop_client = true;
                break;
            }

            self.protocol_errors += 1;
            warn!(
                connection_id,
                error = %err,
                consecutive = self.protocol_errors,
                "protocol error"
            );
            if self.config.protocol_error_limit_reached(self.protocol_errors) {
                warn!(
                    connection_id,
                    limit = self.config.max_protocol_errors,
                    "too many consecutive protocol errors, dropping client"
                );
                drop_client = true;
                break;
            }
        }

        if drop_client {
            self.manager.close();
            self.protocol_errors = 0;
            report.closed = true;
        }
        report
    }

    /// Tick until `running` is cleared, sleeping `idle` after ticks that did
    /// nothing.
    pub fn run_until(&mut self, running: &AtomicBool, idle: Duration) {
        while running.load(Ordering::SeqCst) {
            if self.tick().is_idle() {
                std::thread::sleep(idle);
            }
        }
        self.manager.close();
        info!("CMSIS-DAP server stopped");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.manager.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Consecutive protocol errors seen on the current client.
    pub fn protocol_errors(&self) -> u32 {
        self.protocol_errors
    }

    /// Total exchanges across all clients since start.
    pub fn total_exchanges(&self) -> u64 {
        self.pump.exchanges()
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream};
    use std::sync::Arc;
    use std::time::Instant;

    use dapbridge_frame::{FrameReader, FrameWriter, PacketType, HEADER_SIZE};

    use super::*;
    use crate::processor::{DapInfoStub, EchoProcessor, Processed};

    fn loopback<P: CommandProcessor>(processor: P) -> DapServer<P> {
        let config = ServerConfig::default().with_bind("127.0.0.1:0".parse().unwrap());
        DapServer::start(config, processor).expect("server should start")
    }

    fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream
    }

    /// Tick until `cond` holds for the accumulated reports.
    fn tick_until<P: CommandProcessor>(
        server: &mut DapServer<P>,
        mut cond: impl FnMut(&TickReport) -> bool,
    ) -> TickReport {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut total = TickReport::default();
        loop {
            let report = server.tick();
            total.accepted |= report.accepted;
            total.rejected |= report.rejected;
            total.closed |= report.closed;
            total.exchanges += report.exchanges;
            if cond(&total) {
                return total;
            }
            assert!(Instant::now() < deadline, "condition not met: {total:?}");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn read_response(stream: &mut TcpStream) -> Vec<u8> {
        FrameReader::new(stream, PacketType::Response)
            .read_frame()
            .expect("response should arrive")
            .payload
            .to_vec()
    }

    #[test]
    fn idle_server_does_nothing() {
        let mut server = loopback(EchoProcessor);
        assert!(server.tick().is_idle());
        assert!(!server.is_connected());
    }

    #[test]
    fn answers_dap_info_over_tcp() {
        let mut server = loopback(DapInfoStub::default());
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        FrameWriter::requests()
            .send_frame(&mut client, &[0x00, 0xFF])
            .unwrap();
        tick_until(&mut server, |r| r.exchanges == 1);

        assert_eq!(read_response(&mut client), vec![0x00, 0x02, 0x00, 0x04]);
    }

    #[test]
    fn pipelined_requests_in_one_write() {
        let mut server = loopback(EchoProcessor);
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        let mut wire = Vec::new();
        let mut writer = FrameWriter::requests();
        for payload in [&b"one"[..], b"two", b"three"] {
            writer.send_frame(&mut wire, payload).unwrap();
        }
        client.write_all(&wire).unwrap();

        tick_until(&mut server, |r| r.exchanges == 3);
        assert_eq!(read_response(&mut client), b"one");
        assert_eq!(read_response(&mut client), b"two");
        assert_eq!(read_response(&mut client), b"three");
    }

    #[test]
    fn second_client_rejected_first_keeps_working() {
        let mut server = loopback(EchoProcessor);
        let mut first = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        let mut second = connect(server.local_addr());
        tick_until(&mut server, |r| r.rejected);
        let mut buf = [0u8; 1];
        assert_eq!(second.read(&mut buf).unwrap(), 0);

        FrameWriter::requests().send_frame(&mut first, b"still here").unwrap();
        tick_until(&mut server, |r| r.exchanges == 1);
        assert_eq!(read_response(&mut first), b"still here");
    }

    #[test]
    fn disconnect_returns_to_listening() {
        let mut server = loopback(EchoProcessor);
        let first = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        first.shutdown(Shutdown::Both).unwrap();
        tick_until(&mut server, |r| r.closed);
        assert!(!server.is_connected());

        let _second = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);
        assert_eq!(server.manager().active().map(|a| a.id()), Some(2));
    }

    #[test]
    fn garbage_prefix_costs_one_protocol_error() {
        let mut server = loopback(EchoProcessor);
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        let mut wire = vec![0xDE, 0xAD, 0xBE, 0xEF];
        FrameWriter::requests().send_frame(&mut wire, b"ok").unwrap();
        client.write_all(&wire).unwrap();

        let report = tick_until(&mut server, |r| r.exchanges == 1);
        assert!(!report.closed);
        assert!(server.is_connected());
        assert_eq!(server.protocol_errors(), 0);
        assert_eq!(read_response(&mut client), b"ok");
    }

    #[test]
    fn repeated_protocol_errors_drop_the_client() {
        let config = ServerConfig::default()
            .with_bind("127.0.0.1:0".parse().unwrap())
            .with_max_protocol_errors(3);
        let mut server = DapServer::start(config, EchoProcessor).unwrap();
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        // Three well-formed headers carrying RESPONSE instead of REQUEST.
        let mut wire = Vec::new();
        for _ in 0..3 {
            FrameWriter::responses().send_frame(&mut wire, b"").unwrap();
        }
        assert_eq!(wire.len(), 3 * HEADER_SIZE);
        client.write_all(&wire).unwrap();

        let report = tick_until(&mut server, |r| r.closed);
        assert_eq!(report.exchanges, 0);
        assert!(!server.is_connected());
    }

    #[test]
    fn oversized_length_drops_the_client() {
        let mut server = loopback(EchoProcessor);
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(b"DAP\0");
        header[4..6].copy_from_slice(&2000u16.to_le_bytes());
        header[6] = PacketType::Request.as_u8();
        client.write_all(&header).unwrap();

        tick_until(&mut server, |r| r.closed);
        // The unread header makes the kernel reset rather than close cleanly.
        let mut buf = [0u8; 1];
        match client.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset),
        }
    }

    #[test]
    fn contract_violation_drops_the_client() {
        struct TooLong;

        impl CommandProcessor for TooLong {
            fn process(&mut self, _request: &[u8], _response: &mut [u8]) -> Processed {
                Processed::from_packed(0x0001_FFFF)
            }
        }

        let mut server = loopback(TooLong);
        let mut client = connect(server.local_addr());
        tick_until(&mut server, |r| r.accepted);

        FrameWriter::requests().send_frame(&mut client, b"x").unwrap();
        let report = tick_until(&mut server, |r| r.closed);
        assert_eq!(report.exchanges, 0);
    }

    #[test]
    fn run_until_stops_when_flag_clears() {
        let mut server = loopback(EchoProcessor);
        let addr = server.local_addr();
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            server.run_until(&flag, Duration::from_millis(1));
            server.total_exchanges()
        });

        let mut client = connect(addr);
        FrameWriter::requests().send_frame(&mut client, b"ping").unwrap();
        assert_eq!(read_response(&mut client), b"ping");

        running.store(false, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), 1);
    }
}
