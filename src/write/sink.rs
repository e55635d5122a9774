//! Output sinks and their capabilities.
//!
//! The writer never asks the wrapped writer for its position; every sink
//! counts the bytes that pass through it. Whether headers can be rewritten after the
//! payload is decided once, when the sink is chosen:
//!
//! - [`Seekable`] wraps `Write + Seek` and back-patches local headers.
//! - [`ForwardOnly`] wraps any `Write` and defers CRC and sizes to data
//!   descriptors.

use std::io::{self, Seek, SeekFrom, Write};

/// A byte sink an archive is written to.
pub trait ArchiveSink: Write {
    /// The wrapped writer.
    type Inner;

    /// Offset the next byte will be written at.
    fn position(&self) -> u64;

    /// Returns true if bytes already written can be rewritten.
    fn supports_patch(&self) -> bool;

    /// Overwrites `bytes` at `offset` and returns to the end.
    fn patch(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    /// Discards everything written after `offset`.
    ///
    /// The discarded region is overwritten by later writes; a file sink may
    /// need truncation by its owner if nothing follows.
    fn rewind_to(&mut self, offset: u64) -> io::Result<()>;

    /// Furthest offset ever written, which exceeds [`position`](Self::position)
    /// after a rewind until later writes cover the discarded bytes.
    fn high_water(&self) -> u64 {
        self.position()
    }

    /// Returns the wrapped writer.
    fn into_inner(self) -> Self::Inner;
}

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} requires a seekable sink"),
    )
}

/// A random-access sink.
///
/// Offsets are absolute stream positions, so an archive written after a
/// prefix (such as an executable stub) records offsets a reader of the
/// whole stream can follow.
#[derive(Debug)]
pub struct Seekable<W> {
    inner: W,
    start: u64,
    position: u64,
    high_water: u64,
}

impl<W: Write + Seek> Seekable<W> {
    /// Wraps `inner`, starting the archive at its current position.
    pub fn new(mut inner: W) -> io::Result<Self> {
        let start = inner.stream_position()?;
        Ok(Self {
            inner,
            start,
            position: start,
            high_water: start,
        })
    }

    /// Returns a reference to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Seek> Write for Seekable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        self.high_water = self.high_water.max(self.position);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> ArchiveSink for Seekable<W> {
    type Inner = W;

    fn position(&self) -> u64 {
        self.position
    }

    fn supports_patch(&self) -> bool {
        true
    }

    fn patch(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        if offset < self.start || offset + bytes.len() as u64 > self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "patch of {} bytes at {offset:#x} is outside {:#x}..{:#x}",
                    bytes.len(),
                    self.start,
                    self.position
                ),
            ));
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    fn rewind_to(&mut self, offset: u64) -> io::Result<()> {
        if offset < self.start || offset > self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot rewind to {offset:#x}"),
            ));
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    fn high_water(&self) -> u64 {
        self.high_water
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

/// A forward-only sink such as a socket, pipe or hash.
#[derive(Debug)]
pub struct ForwardOnly<W> {
    inner: W,
    position: u64,
}

impl<W: Write> ForwardOnly<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Returns a reference to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for ForwardOnly<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> ArchiveSink for ForwardOnly<W> {
    type Inner = W;

    fn position(&self) -> u64 {
        self.position
    }

    fn supports_patch(&self) -> bool {
        false
    }

    fn patch(&mut self, _offset: u64, _bytes: &[u8]) -> io::Result<()> {
        Err(unsupported("patching a header"))
    }

    fn rewind_to(&mut self, _offset: u64) -> io::Result<()> {
        Err(unsupported("discarding an entry"))
    }

    fn into_inner(self) -> W {
        self.inner
    }
}
