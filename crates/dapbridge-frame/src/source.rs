//! Byte sources the reassembler can inspect without blocking.

use std::io::{self, Write};

use bytes::{Buf, BytesMut};
use dapbridge_transport::TcpConnection;

/// A stream whose buffered bytes can be counted and peeked before they are
/// consumed.
///
/// All three operations must return promptly. An empty source reports zero
/// available bytes rather than blocking.
pub trait FrameSource {
    /// Number of bytes that can be consumed right now.
    fn available(&mut self) -> io::Result<usize>;

    /// Copy up to `buf.len()` bytes from the front without consuming them.
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Copy up to `buf.len()` bytes from the front and consume them.
    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: FrameSource + ?Sized> FrameSource for &mut T {
    fn available(&mut self) -> io::Result<usize> {
        (**self).available()
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).peek(buf)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).consume(buf)
    }
}

impl FrameSource for TcpConnection {
    fn available(&mut self) -> io::Result<usize> {
        TcpConnection::available(self)
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpConnection::peek(self, buf)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}

/// In-memory duplex stand-in for a connection.
///
/// Inbound bytes are pushed in arbitrary chunks with [`MemorySource::push`];
/// everything written through `Write` is captured for inspection. An optional
/// per-call write limit simulates a transport that accepts only part of a
/// write.
#[derive(Debug, Default)]
pub struct MemorySource {
    inbound: BytesMut,
    outbound: Vec<u8>,
    write_limit: Option<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source with `bytes` already buffered.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut source = Self::new();
        source.push(bytes);
        source
    }

    /// Cap the number of bytes each `write` call accepts.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Simulate the arrival of more bytes from the peer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Bytes buffered and not yet consumed.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    /// Take everything written so far, leaving the capture empty.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

impl FrameSource for MemorySource {
    fn available(&mut self) -> io::Result<usize> {
        Ok(self.inbound.len())
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.inbound.len());
        buf[..n].copy_from_slice(&self.inbound[..n]);
        Ok(n)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.peek(buf)?;
        self.inbound.advance(n);
        Ok(n)
    }
}

impl Write for MemorySource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.write_limit {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        self.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_then_consume() {
        let mut src = MemorySource::from_bytes(b"abcdef");
        assert_eq!(src.available().unwrap(), 6);

        let mut head = [0u8; 4];
        assert_eq!(src.peek(&mut head).unwrap(), 4);
        assert_eq!(&head, b"abcd");
        assert_eq!(src.available().unwrap(), 6);

        assert_eq!(src.consume(&mut head).unwrap(), 4);
        assert_eq!(src.available().unwrap(), 2);

        let mut tail = [0u8; 8];
        assert_eq!(src.consume(&mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], b"ef");
        assert_eq!(src.pending(), 0);
    }

    #[test]
    fn write_limit_truncates_each_call() {
        let mut src = MemorySource::new().with_write_limit(3);
        assert_eq!(src.write(b"hello").unwrap(), 3);
        assert_eq!(src.written(), b"hel");
        assert_eq!(src.take_written(), b"hel".to_vec());
        assert!(src.written().is_empty());
    }

    #[test]
    fn works_through_mut_reference() {
        fn drain<S: FrameSource>(mut src: S) -> usize {
            let mut buf = [0u8; 16];
            src.consume(&mut buf).unwrap()
        }

        let mut src = MemorySource::from_bytes(b"xyz");
        assert_eq!(drain(&mut src), 3);
        assert_eq!(src.pending(), 0);
    }
}
