//! Byte sinks the framer flushes into

use std::io::{self, Write};

/// Destination of framed output
///
/// Errors are returned unchanged to the caller of the framer; no retry
/// happens at this layer.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapter for any [`std::io::Write`] (sockets, files, stdout)
#[derive(Debug)]
pub struct WriteTransport<W: Write> {
    inner: W,
}

impl<W: Write> WriteTransport<W> {
    pub fn new(inner: W) -> Self {
        WriteTransport { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Transport for WriteTransport<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// In-memory transport that records what it receives
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    data: Vec<u8>,
    writes: usize,
    flushes: usize,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every byte written so far
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of `write` calls
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Number of `flush` calls
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to closed transport",
            ));
        }
        self.data.extend_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
