//! Non-blocking TCP primitives for the CMSIS-DAP bridge.
//!
//! This is the lowest layer of dapbridge. It exposes exactly what the
//! single-client server needs from the socket layer and nothing more:
//! - a non-blocking listener with a backlog of one pending connection
//! - a connection handle that can report buffered byte counts, peek without
//!   consuming, and probe whether the peer has gone away
//! - TCP keepalive tuning for detecting silently dead peers
//!
//! Everything above this crate talks to [`TcpConnection`].

pub mod error;
pub mod keepalive;
pub mod listener;
pub mod stream;

mod sys;

pub use error::{Result, TransportError};
pub use keepalive::KeepaliveConfig;
pub use listener::TcpServer;
pub use stream::{Liveness, TcpConnection};
