use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Frame header: signature (4) + length (2) + type (1) + reserved (1) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Width of the leading signature field.
pub const SIGNATURE_SIZE: usize = 4;

/// Protocol signature, "DAP\0" when laid out little-endian on the wire.
///
/// A future incompatible revision of the framing must change this value.
pub const SIGNATURE: u32 = 0x0050_4144;

/// Maximum payload size, matching the probe's CMSIS-DAP packet size.
pub const MAX_PAYLOAD: usize = 1024;

/// A decoded frame header.
///
/// Fields are kept raw so a header can be inspected before it is trusted:
/// `length` means nothing until the signature has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub signature: u32,
    pub length: u16,
    pub packet_type: u8,
}

impl FrameHeader {
    /// Header for an outbound frame carrying `length` payload bytes.
    pub fn new(packet_type: PacketType, length: u16) -> Self {
        Self {
            signature: SIGNATURE,
            length,
            packet_type: packet_type.as_u8(),
        }
    }

    /// Parse the 8 header bytes. The reserved byte is ignored.
    pub fn parse(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut src = &raw[..];
        let signature = src.get_u32_le();
        let length = src.get_u16_le();
        let packet_type = src.get_u8();
        Self {
            signature,
            length,
            packet_type,
        }
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.signature);
        dst.put_u16_le(self.length);
        dst.put_u8(self.packet_type);
        dst.put_u8(0);
    }

    /// Wire form of this header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.signature.to_le_bytes());
        out[4..6].copy_from_slice(&self.length.to_le_bytes());
        out[6] = self.packet_type;
        out
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == SIGNATURE
    }

    pub fn payload_len(&self) -> usize {
        usize::from(self.length)
    }

    /// Check signature, packet type and length, in that order.
    ///
    /// Returns the payload length on success.
    pub fn validate(&self, expected: PacketType, max_payload: usize) -> Result<usize> {
        if !self.has_valid_signature() {
            return Err(FrameError::InvalidSignature {
                found: self.signature,
            });
        }
        if self.packet_type != expected.as_u8() {
            return Err(FrameError::UnexpectedPacketType {
                found: self.packet_type,
                expected,
            });
        }
        let len = self.payload_len();
        if len > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: max_payload,
            });
        }
        Ok(len)
    }
}

/// A complete framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────┬────────────┬──────────┬──────────┬──────────────────┐
/// │ Signature (4B) │ Length     │ Type     │ Reserved │ Payload          │
/// │ 0x00504144 LE  │ (2B LE)    │ (1B)     │ (1B, 0)  │ (Length bytes)   │
/// │ "DAP\0"        │ <= 1024    │ 1=req    │          │                  │
/// │                │            │ 2=resp   │          │                  │
/// └────────────────┴────────────┴──────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(packet_type: PacketType, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    // Bounded by MAX_PAYLOAD above, so the length always fits in u16.
    FrameHeader::new(packet_type, payload.len() as u16).encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame of the expected type from an accumulated buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On error nothing is
/// consumed; the caller decides whether the stream is salvageable.
pub fn decode_frame(
    src: &mut BytesMut,
    expected: PacketType,
    max_payload: usize,
) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = FrameHeader::parse(&raw).validate(expected, max_payload)?;

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        packet_type: expected,
        payload,
    }))
}
