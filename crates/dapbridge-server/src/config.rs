use std::net::{Ipv4Addr, SocketAddr};

use dapbridge_transport::KeepaliveConfig;

/// Default TCP port for framed CMSIS-DAP traffic.
pub const DEFAULT_PORT: u16 = 4441;

/// Default TCP port for the raw console bridge.
pub const DEFAULT_CONSOLE_PORT: u16 = 4442;

/// Consecutive protocol errors tolerated before a client is dropped.
pub const DEFAULT_MAX_PROTOCOL_ERRORS: u32 = 8;

/// Start-up configuration for a [`DapServer`](crate::DapServer).
///
/// Settings are fixed once the server is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind: SocketAddr,
    /// Keepalive tuning for accepted clients; `None` leaves keepalive off.
    pub keepalive: Option<KeepaliveConfig>,
    /// Consecutive protocol errors (bad signature or packet type) after which
    /// the client is disconnected. Zero disables the limit.
    pub max_protocol_errors: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            keepalive: Some(KeepaliveConfig::default()),
            max_protocol_errors: DEFAULT_MAX_PROTOCOL_ERRORS,
        }
    }
}

impl ServerConfig {
    /// Listen on all IPv4 interfaces at `port`.
    pub fn on_port(port: u16) -> Self {
        Self::default().with_port(port)
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Keep the bind address, change only the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    pub fn with_keepalive(mut self, keepalive: Option<KeepaliveConfig>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_max_protocol_errors(mut self, max: u32) -> Self {
        self.max_protocol_errors = max;
        self
    }

    /// Whether `count` consecutive protocol errors should end the connection.
    pub(crate) fn protocol_error_limit_reached(&self, count: u32) -> bool {
        self.max_protocol_errors != 0 && count >= self.max_protocol_errors
    }
}
