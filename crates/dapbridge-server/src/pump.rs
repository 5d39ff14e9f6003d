use std::io::Write;

use dapbridge_frame::{FrameSource, Received, MAX_PAYLOAD};
use tracing::trace;

use crate::error::{Result, ServerError};
use crate::link::FramedLink;
use crate::processor::CommandProcessor;

/// Drains complete requests from a link, runs each through the command
/// processor and sends its response before looking at the next one.
///
/// Owns the request and response scratch buffers, so no allocation happens
/// per exchange.
#[derive(Debug)]
pub struct RequestPump {
    request: Box<[u8]>,
    response: Box<[u8]>,
    exchanges: u64,
}

impl Default for RequestPump {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestPump {
    pub fn new() -> Self {
        Self {
            request: vec![0u8; MAX_PAYLOAD].into_boxed_slice(),
            response: vec![0u8; MAX_PAYLOAD].into_boxed_slice(),
            exchanges: 0,
        }
    }

    /// Total request/response exchanges completed by this pump.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Service every complete request buffered on `link`.
    ///
    /// Returns the number of exchanges once no complete frame remains. Stops
    /// at the first error; exchanges completed before it are still counted
    /// in [`exchanges`](Self::exchanges).
    pub fn service<S, P>(&mut self, link: &mut FramedLink<S>, processor: &mut P) -> Result<usize>
    where
        S: FrameSource + Write,
        P: CommandProcessor + ?Sized,
    {
        let mut done = 0usize;
        loop {
            let len = match link.try_receive_frame(&mut self.request)? {
                Received::Incomplete => return Ok(done),
                Received::Frame(len) => len,
            };

            let processed = processor.process(&self.request[..len], &mut self.response);
            let response_len = usize::from(processed.response_len);
            trace!(
                request_len = processed.request_len,
                response_len,
                "processed command"
            );
            if response_len > self.response.len() {
                return Err(ServerError::ProcessorContract {
                    len: response_len,
                    max: self.response.len(),
                });
            }

            link.send_frame(&self.response[..response_len])?;
            done += 1;
            self.exchanges += 1;
        }
    }
}
