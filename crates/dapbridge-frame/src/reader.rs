use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{Frame, FrameHeader, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Reads complete frames from any blocking `Read` stream.
///
/// This is the host-side counterpart of the [`Reassembler`](crate::Reassembler):
/// a debugger waiting on a probe response can simply block. Any framing error
/// is final, since a blocking reader has no way to resynchronize.
pub struct FrameReader<T> {
    inner: T,
    expected: PacketType,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader that accepts only frames of `expected` type.
    pub fn new(inner: T, expected: PacketType) -> Self {
        Self { inner, expected }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut raw = [0u8; HEADER_SIZE];
        self.fill(&mut raw)?;

        let len = FrameHeader::parse(&raw).validate(self.expected, MAX_PAYLOAD)?;

        let mut payload = BytesMut::zeroed(len);
        self.fill(&mut payload)?;

        Ok(Frame {
            packet_type: self.expected,
            payload: payload.freeze(),
        })
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
