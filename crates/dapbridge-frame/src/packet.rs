//! Packet type discriminator carried in the frame header.

use std::fmt;

/// Direction of a framed CMSIS-DAP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Host (debugger) to probe.
    Request = 0x01,
    /// Probe to host.
    Response = 0x02,
}

impl PacketType {
    /// Wire value of this packet type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value, returning `None` for anything unrecognized.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(PacketType::Request),
            0x02 => Some(PacketType::Response),
            _ => None,
        }
    }

    /// Returns a human-readable name for the packet type.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Request => "REQUEST",
            PacketType::Response => "RESPONSE",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
