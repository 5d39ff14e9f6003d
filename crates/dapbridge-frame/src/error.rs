use crate::packet::PacketType;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header does not start with the protocol signature.
    #[error("invalid frame signature {found:#010x} (expected 0x00504144 \"DAP\\0\")")]
    InvalidSignature { found: u32 },

    /// The header carries a packet type other than the one expected here.
    #[error("unexpected packet type {found:#04x} (expected {expected})")]
    UnexpectedPacketType { found: u8, expected: PacketType },

    /// The payload exceeds the maximum size or the destination buffer.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transport accepted fewer bytes than the frame required.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The transport delivered fewer bytes than it reported as buffered.
    #[error("short read ({read} of {expected} bytes)")]
    ShortRead { read: usize, expected: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error describes malformed input from the peer, as opposed
    /// to a transport failure.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidSignature { .. }
                | FrameError::UnexpectedPacketType { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }

    /// Whether the connection can no longer be used after this error.
    ///
    /// Only a bad signature or bad packet type leave the stream usable: the
    /// offending header bytes have already been discarded.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            FrameError::InvalidSignature { .. } | FrameError::UnexpectedPacketType { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
