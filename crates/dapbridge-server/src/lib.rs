//! Single-client CMSIS-DAP over TCP server.
//!
//! A debug probe serves exactly one host at a time. This crate wires the
//! transport and framing layers into that shape:
//! - [`ConnectionManager`] accepts one client, turns others away and notices
//!   when the client leaves
//! - [`RequestPump`] feeds every complete request to a [`CommandProcessor`]
//!   and frames its response before reading the next
//! - [`DapServer`] composes both behind a non-blocking [`tick`](DapServer::tick)
//! - [`ConsoleBridge`] relays a serial console over a second port, unframed

pub mod config;
pub mod console;
pub mod error;
pub mod link;
pub mod manager;
pub mod processor;
pub mod pump;
pub mod server;

pub use config::{ServerConfig, DEFAULT_CONSOLE_PORT, DEFAULT_MAX_PROTOCOL_ERRORS, DEFAULT_PORT};
pub use console::{ConsoleBridge, ConsoleReport, CONSOLE_CHUNK};
pub use error::{Result, ServerError};
pub use link::FramedLink;
pub use manager::{ActiveConnection, ConnectionManager, ConnectionState, NewConnection};
pub use processor::{CommandProcessor, DapInfoStub, EchoProcessor, Processed};
pub use pump::RequestPump;
pub use server::{DapServer, TickReport};
