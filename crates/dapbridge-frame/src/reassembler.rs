//! Non-blocking, peek-then-consume frame reassembly.
//!
//! The reassembler never consumes a byte of a well-formed frame until the
//! whole frame (header and payload) is buffered. A short read therefore can
//! never leave half a frame consumed and the stream unrecoverable.
//!
//! ```text
//!            available >= 8, header valid
//! AwaitingHeader ───────────────────────────▶ AwaitingPayload(len)
//!       ▲                                            │
//!       └──────── available >= 8 + len: consume ─────┘
//! ```

use std::io::ErrorKind;

use tracing::{debug, trace};

use crate::codec::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD, SIGNATURE_SIZE};
use crate::error::{FrameError, Result};
use crate::packet::PacketType;
use crate::source::FrameSource;

/// Outcome of a successful reassembly attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Not enough bytes buffered yet; try again on a later tick.
    Incomplete,
    /// A complete payload of this many bytes was copied out and consumed.
    Frame(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    /// A valid header sits unconsumed at the front of the source.
    AwaitingPayload { len: usize },
}

/// Incremental frame extractor for one connection.
#[derive(Debug, Clone)]
pub struct Reassembler {
    state: State,
    expected: PacketType,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    /// Reassembler for inbound requests, as seen by the probe.
    pub fn new() -> Self {
        Self::expecting(PacketType::Request)
    }

    /// Reassembler accepting only frames of `expected` type.
    pub fn expecting(expected: PacketType) -> Self {
        Self {
            state: State::AwaitingHeader,
            expected,
        }
    }

    /// Forget any partially observed frame. Call when the source changes.
    pub fn reset(&mut self) {
        self.state = State::AwaitingHeader;
    }

    /// Whether a validated header is waiting for its payload.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::AwaitingPayload { .. })
    }

    /// Try to extract one complete frame into `payload`.
    ///
    /// - `Ok(Received::Incomplete)`: nothing consumed, come back later.
    /// - `Ok(Received::Frame(n))`: `payload[..n]` holds the frame and exactly
    ///   `HEADER_SIZE + n` bytes were consumed.
    /// - `Err(InvalidSignature)`: the 4 signature bytes were discarded.
    /// - `Err(UnexpectedPacketType)`: the 8 header bytes were discarded.
    /// - `Err(PayloadTooLarge)`: nothing consumed; the stream cannot be
    ///   resynchronized and the connection should be dropped.
    pub fn try_receive<S>(&mut self, src: &mut S, payload: &mut [u8]) -> Result<Received>
    where
        S: FrameSource + ?Sized,
    {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    if src.available()? < HEADER_SIZE {
                        return Ok(Received::Incomplete);
                    }

                    trace!("peeking at header");
                    let mut raw = [0u8; HEADER_SIZE];
                    let peeked = src.peek(&mut raw)?;
                    if peeked < HEADER_SIZE {
                        return Err(FrameError::ShortRead {
                            read: peeked,
                            expected: HEADER_SIZE,
                        });
                    }

                    let header = FrameHeader::parse(&raw);
                    let limit = payload.len().min(MAX_PAYLOAD);
                    match header.validate(self.expected, limit) {
                        Ok(len) => self.state = State::AwaitingPayload { len },
                        Err(err @ FrameError::InvalidSignature { .. }) => {
                            // Only the signature was examined; the length is untrusted.
                            discard(src, SIGNATURE_SIZE)?;
                            return Err(err);
                        }
                        Err(err @ FrameError::UnexpectedPacketType { .. }) => {
                            discard(src, HEADER_SIZE)?;
                            return Err(err);
                        }
                        Err(err) => return Err(err),
                    }
                }
                State::AwaitingPayload { len } => {
                    if len > payload.len() {
                        return Err(FrameError::PayloadTooLarge {
                            size: len,
                            max: payload.len(),
                        });
                    }
                    if src.available()? < HEADER_SIZE + len {
                        return Ok(Received::Incomplete);
                    }

                    let mut raw = [0u8; HEADER_SIZE];
                    consume_exact(src, &mut raw)?;
                    consume_exact(src, &mut payload[..len])?;
                    self.state = State::AwaitingHeader;

                    debug!(len, packet_type = %self.expected, "received frame");
                    return Ok(Received::Frame(len));
                }
            }
        }
    }
}

fn discard<S: FrameSource + ?Sized>(src: &mut S, count: usize) -> Result<()> {
    let mut scratch = [0u8; HEADER_SIZE];
    consume_exact(src, &mut scratch[..count])
}

/// Consume exactly `buf.len()` bytes that the source already reported as buffered.
fn consume_exact<S: FrameSource + ?Sized>(src: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match src.consume(&mut buf[filled..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                return Err(FrameError::ShortRead {
                    read: filled,
                    expected: buf.len(),
                })
            }
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
