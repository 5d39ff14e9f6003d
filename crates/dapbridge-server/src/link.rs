use std::io::Write;

use dapbridge_frame::{FrameSource, FrameWriter, Reassembler, Received, Result};

/// One framed byte stream as the probe sees it: REQUEST frames in,
/// RESPONSE frames out.
///
/// Generic over the stream so the pump can be driven by an in-memory source
/// as easily as by a socket.
#[derive(Debug)]
pub struct FramedLink<S> {
    io: S,
    reassembler: Reassembler,
    writer: FrameWriter,
}

impl<S: FrameSource + Write> FramedLink<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            reassembler: Reassembler::new(),
            writer: FrameWriter::responses(),
        }
    }

    /// Bytes buffered on the stream, or zero if the query fails.
    pub fn bytes_available(&mut self) -> usize {
        self.io.available().unwrap_or(0)
    }

    /// Extract one complete request into `payload` without blocking.
    pub fn try_receive_frame(&mut self, payload: &mut [u8]) -> Result<Received> {
        self.reassembler.try_receive(&mut self.io, payload)
    }

    /// Frame `payload` as a response and write it out in one call.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.send_frame(&mut self.io, payload)
    }

    /// Whether a request header has been seen but its payload is still arriving.
    pub fn is_mid_frame(&self) -> bool {
        self.reassembler.is_mid_frame()
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}
