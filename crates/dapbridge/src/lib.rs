//! CMSIS-DAP over TCP.
//!
//! CMSIS-DAP debug probes normally talk to the host over USB, which keeps
//! each request and response in its own packet. dapbridge carries the same
//! packets over TCP by prefixing each one with a small header, and provides
//! the probe side of the link: a non-blocking, single-client server that
//! hands every request to a command processor.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking TCP listener and connection primitives
//! - [`frame`]: Packet header, reassembly and frame writers
//! - [`server`]: Connection manager, request pump and console bridge
//!   (behind the `server` feature, on by default)

/// Re-export transport types.
pub mod transport {
    pub use dapbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use dapbridge_frame::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use dapbridge_server::*;
}
