//! The seam between the transport and whatever interprets CMSIS-DAP commands.

/// Byte counts reported by a [`CommandProcessor`] for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Processed {
    /// Request bytes the command consumed.
    pub request_len: u16,
    /// Response bytes written to the response buffer.
    pub response_len: u16,
}

impl Processed {
    pub fn new(request_len: u16, response_len: u16) -> Self {
        Self {
            request_len,
            response_len,
        }
    }

    /// Split the packed word used by CMSIS-DAP firmware: request length in
    /// the upper 16 bits, response length in the lower 16.
    pub fn from_packed(word: u32) -> Self {
        Self {
            request_len: (word >> 16) as u16,
            response_len: (word & 0xFFFF) as u16,
        }
    }

    /// Inverse of [`from_packed`](Self::from_packed).
    pub fn packed(&self) -> u32 {
        (u32::from(self.request_len) << 16) | u32::from(self.response_len)
    }
}

/// Executes one CMSIS-DAP request and writes its response.
///
/// `response` is as long as the largest response the transport can carry.
/// Reporting a `response_len` beyond it is a contract violation and costs
/// the client its connection.
pub trait CommandProcessor {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Processed;
}

impl<P: CommandProcessor + ?Sized> CommandProcessor for &mut P {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Processed {
        (**self).process(request, response)
    }
}

impl<P: CommandProcessor + ?Sized> CommandProcessor for Box<P> {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Processed {
        (**self).process(request, response)
    }
}

/// Answers every request with its own bytes. Useful for link testing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoProcessor;

impl CommandProcessor for EchoProcessor {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Processed {
        let n = request.len().min(response.len());
        response[..n].copy_from_slice(&request[..n]);
        let n = u16::try_from(n).unwrap_or(u16::MAX);
        Processed::new(n, n)
    }
}

pub const ID_DAP_INFO: u8 = 0x00;
pub const ID_DAP_INVALID: u8 = 0xFF;
pub const DAP_ID_PACKET_COUNT: u8 = 0xFE;
pub const DAP_ID_PACKET_SIZE: u8 = 0xFF;

/// Minimal stand-in for a probe: enough of `DAP_Info` for a host to size its
/// packets, and "invalid command" for everything else.
///
/// This is a test aid for host tooling, not a debug adapter.
#[derive(Debug, Clone, Copy)]
pub struct DapInfoStub {
    pub packet_size: u16,
    pub packet_count: u8,
}

impl Default for DapInfoStub {
    fn default() -> Self {
        Self {
            packet_size: 1024,
            packet_count: 8,
        }
    }
}

impl DapInfoStub {
    fn info(&self, id: u8, response: &mut [u8]) -> u16 {
        let size = self.packet_size.to_le_bytes();
        let count = [self.packet_count];
        let data: &[u8] = match id {
            DAP_ID_PACKET_SIZE => &size,
            DAP_ID_PACKET_COUNT => &count,
            // Unsupported info IDs answer with zero-length data.
            _ => &[],
        };
        let total = 2 + data.len();
        if response.len() < total {
            return 0;
        }
        response[0] = ID_DAP_INFO;
        response[1] = data.len() as u8;
        response[2..total].copy_from_slice(data);
        total as u16
    }
}

impl CommandProcessor for DapInfoStub {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Processed {
        match request {
            [ID_DAP_INFO, id, ..] => Processed::new(2, self.info(*id, response)),
            [_, ..] if !response.is_empty() => {
                response[0] = ID_DAP_INVALID;
                Processed::new(1, 1)
            }
            _ if !response.is_empty() => {
                response[0] = ID_DAP_INVALID;
                Processed::new(0, 1)
            }
            _ => Processed::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_word_layout() {
        let processed = Processed::from_packed(0x0002_0004);
        assert_eq!(processed, Processed::new(2, 4));
        assert_eq!(processed.packed(), 0x0002_0004);
        assert_eq!(Processed::from_packed(0xFFFF_0000).response_len, 0);
    }

    #[test]
    fn echo_copies_request() {
        let mut response = [0u8; 8];
        let processed = EchoProcessor.process(b"ping", &mut response);
        assert_eq!(processed, Processed::new(4, 4));
        assert_eq!(&response[..4], b"ping");
    }

    #[test]
    fn echo_truncates_to_response_buffer() {
        let mut response = [0u8; 2];
        let processed = EchoProcessor.process(b"ping", &mut response);
        assert_eq!(processed.response_len, 2);
        assert_eq!(&response, b"pi");
    }

    #[test]
    fn stub_reports_packet_size_and_count() {
        let mut stub = DapInfoStub::default();
        let mut response = [0u8; 16];

        let processed = stub.process(&[ID_DAP_INFO, DAP_ID_PACKET_SIZE], &mut response);
        assert_eq!(processed, Processed::new(2, 4));
        assert_eq!(&response[..4], &[0x00, 0x02, 0x00, 0x04]);

        let processed = stub.process(&[ID_DAP_INFO, DAP_ID_PACKET_COUNT], &mut response);
        assert_eq!(processed, Processed::new(2, 3));
        assert_eq!(&response[..3], &[0x00, 0x01, 0x08]);
    }

    #[test]
    fn stub_answers_unknown_info_with_empty_data() {
        let mut response = [0u8; 16];
        let processed = DapInfoStub::default().process(&[ID_DAP_INFO, 0x01], &mut response);
        assert_eq!(processed, Processed::new(2, 2));
        assert_eq!(&response[..2], &[0x00, 0x00]);
    }

    #[test]
    fn stub_rejects_other_commands() {
        let mut response = [0u8; 16];
        let processed = DapInfoStub::default().process(&[0x02, 0x01], &mut response);
        assert_eq!(processed, Processed::new(1, 1));
        assert_eq!(response[0], ID_DAP_INVALID);

        let processed = DapInfoStub::default().process(&[], &mut response);
        assert_eq!(processed, Processed::new(0, 1));
    }

    #[test]
    fn processors_work_through_box_and_reference() {
        let mut boxed: Box<dyn CommandProcessor> = Box::new(EchoProcessor);
        let mut response = [0u8; 4];
        assert_eq!(boxed.process(b"ab", &mut response).response_len, 2);

        let mut echo = EchoProcessor;
        let by_ref = &mut echo;
        fn run<P: CommandProcessor>(mut p: P) -> u16 {
            p.process(b"xyz", &mut [0u8; 4]).response_len
        }
        assert_eq!(run(by_ref), 3);
    }
}
