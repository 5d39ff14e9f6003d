use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{encode_frame, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Frames payloads and hands each frame to the transport in a single write.
///
/// There is no partial-write resume: if the transport accepts fewer bytes
/// than the whole frame, the frame is lost and the caller gets
/// [`FrameError::ShortWrite`]. The scratch buffer is reused across frames.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    packet_type: PacketType,
}

impl FrameWriter {
    /// Create a writer that emits frames of `packet_type`.
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD),
            packet_type,
        }
    }

    /// Writer for the probe side: emits RESPONSE frames.
    pub fn responses() -> Self {
        Self::new(PacketType::Response)
    }

    /// Writer for the host side: emits REQUEST frames.
    pub fn requests() -> Self {
        Self::new(PacketType::Request)
    }

    /// Packet type stamped on every frame this writer emits.
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Encode `payload` and write header plus payload with one write call.
    pub fn send_frame<W>(&mut self, sink: &mut W, payload: &[u8]) -> Result<()>
    where
        W: Write + ?Sized,
    {
        self.buf.clear();
        encode_frame(self.packet_type, payload, &mut self.buf)?;
        let expected = self.buf.len();

        let written = loop {
            match sink.write(&self.buf) {
                Ok(n) => break n,
                // Nothing was written; repeating the call is still a single write.
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break 0,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if written != expected {
            return Err(FrameError::ShortWrite { written, expected });
        }

        self.flush(sink)?;
        debug!(len = payload.len(), packet_type = %self.packet_type, "sent frame");
        Ok(())
    }

    fn flush<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        loop {
            match sink.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}
