//! Packet framing for CMSIS-DAP carried over a TCP byte stream.
//!
//! USB preserves the boundaries between CMSIS-DAP requests; TCP does not, so
//! every request and response is prefixed with a small header:
//! - A 4-byte little-endian signature (`0x00504144`, "DAP\0") for stream sanity
//! - A 2-byte little-endian payload length (at most 1024)
//! - A 1-byte packet type (request or response)
//! - A reserved byte, written as zero and ignored on read
//!
//! The device side never blocks: the [`Reassembler`] peeks at buffered bytes
//! and consumes nothing until a whole frame is present.

pub mod codec;
pub mod error;
pub mod packet;
pub mod reader;
pub mod reassembler;
pub mod source;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameHeader, HEADER_SIZE, MAX_PAYLOAD, SIGNATURE,
    SIGNATURE_SIZE,
};
pub use error::{FrameError, Result};
pub use packet::PacketType;
pub use reader::FrameReader;
pub use reassembler::{Reassembler, Received};
pub use source::{FrameSource, MemorySource};
pub use writer::FrameWriter;
