//! Compression codecs for ZIP entries.
//!
//! Two methods are supported: stored (method 0) and deflate (method 8).
//! Large deflate entries can be compressed on a worker pool by
//! [`ParallelDeflateWriter`]; its output is a single valid deflate stream
//! that any inflater accepts.

mod deflate;
mod parallel;
mod stored;

use std::io::{self, Read, Write};

use crate::{Error, Result};

pub use deflate::{DeflateDecoder, DeflateEncoder};
pub use parallel::{
    DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE, ParallelDeflateOptions, ParallelDeflateWriter,
};
pub use stored::StoredDecoder;

/// Default compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Highest accepted compression level.
pub const MAX_LEVEL: u32 = 9;

/// ZIP compression method identifiers.
pub mod method {
    /// Stored (no compression).
    pub const STORED: u16 = 0;
    /// Deflate.
    pub const DEFLATE: u16 = 8;
    /// Marker method for WinZip AES; the real method is in the AES extra field.
    pub const AES: u16 = 99;

    /// Returns a human-readable name for a method id.
    pub fn name(id: u16) -> &'static str {
        match id {
            STORED => "Stored",
            DEFLATE => "Deflate",
            AES => "AES",
            1 => "Shrink",
            6 => "Implode",
            9 => "Deflate64",
            12 => "BZip2",
            14 => "LZMA",
            93 => "Zstandard",
            95 => "XZ",
            _ => "Unknown",
        }
    }
}

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Raw deflate.
    #[default]
    Deflate,
}

impl CompressionMethod {
    /// Returns the ZIP method id.
    pub const fn id(self) -> u16 {
        match self {
            CompressionMethod::Stored => method::STORED,
            CompressionMethod::Deflate => method::DEFLATE,
        }
    }

    /// Maps a ZIP method id to a supported method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] for anything but 0 and 8.
    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            method::STORED => Ok(CompressionMethod::Stored),
            method::DEFLATE => Ok(CompressionMethod::Deflate),
            other => Err(Error::UnsupportedMethod { method_id: other }),
        }
    }

    /// Returns the method name.
    pub fn name(self) -> &'static str {
        method::name(self.id())
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validates a compression level.
///
/// # Errors
///
/// Returns [`Error::InvalidCompressionLevel`] for levels above 9.
pub fn validate_level(level: u32) -> Result<u32> {
    if level > MAX_LEVEL {
        return Err(Error::InvalidCompressionLevel { level });
    }
    Ok(level)
}

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read {
    /// Returns the method this decoder reverses.
    fn method(&self) -> CompressionMethod;
}

/// Builds a decoder for `method` over `input`, which must be limited to the
/// entry's compressed bytes (after decryption).
pub(crate) fn build_decoder<'a, R: Read + 'a>(
    method: CompressionMethod,
    input: R,
    uncompressed_size: u64,
) -> Box<dyn Decoder + 'a> {
    match method {
        CompressionMethod::Stored => Box::new(StoredDecoder::new(input, uncompressed_size)),
        CompressionMethod::Deflate => Box::new(DeflateDecoder::new(io::BufReader::new(input))),
    }
}

/// The compressor of one entry, writing compressed bytes into `W`.
pub(crate) enum EntryEncoder<W: Write> {
    Stored(W),
    Deflate(DeflateEncoder<W>),
    Parallel(Box<ParallelDeflateWriter<W>>),
}

impl<W: Write> EntryEncoder<W> {
    /// Picks serial or parallel deflate from the options.
    pub(crate) fn new(
        method: CompressionMethod,
        level: u32,
        parallel: Option<&ParallelDeflateOptions>,
        sink: W,
    ) -> Result<Self> {
        let level = validate_level(level)?;
        Ok(match (method, parallel) {
            (CompressionMethod::Stored, _) => EntryEncoder::Stored(sink),
            (CompressionMethod::Deflate, Some(options)) => {
                let options = options.clone().level(level);
                EntryEncoder::Parallel(Box::new(ParallelDeflateWriter::new(sink, options)?))
            }
            (CompressionMethod::Deflate, None) => {
                EntryEncoder::Deflate(DeflateEncoder::new(sink, level))
            }
        })
    }

    /// Returns true when blocks are compressed by the parallel writer.
    pub(crate) fn is_parallel(&self) -> bool {
        matches!(self, EntryEncoder::Parallel(_))
    }

    /// Mutable access to the sink holding compressed output.
    pub(crate) fn sink_mut(&mut self) -> &mut W {
        match self {
            EntryEncoder::Stored(w) => w,
            EntryEncoder::Deflate(e) => e.get_mut(),
            EntryEncoder::Parallel(p) => p.get_mut(),
        }
    }

    /// Flushes the compressor and returns the sink, plus the CRC-32 of the
    /// input when the encoder computed it.
    pub(crate) fn finish(self) -> io::Result<(W, Option<u32>)> {
        match self {
            EntryEncoder::Stored(w) => Ok((w, None)),
            EntryEncoder::Deflate(e) => Ok((e.try_finish()?, None)),
            EntryEncoder::Parallel(p) => {
                let (w, crc) = p.finish()?;
                Ok((w, Some(crc)))
            }
        }
    }
}

impl<W: Write> Write for EntryEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryEncoder::Stored(w) => w.write(buf),
            EntryEncoder::Deflate(e) => e.write(buf),
            EntryEncoder::Parallel(p) => p.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryEncoder::Stored(w) => w.flush(),
            EntryEncoder::Deflate(e) => e.flush(),
            EntryEncoder::Parallel(p) => p.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_ids() {
        assert_eq!(CompressionMethod::Stored.id(), 0);
        assert_eq!(CompressionMethod::Deflate.id(), 8);
        assert_eq!(CompressionMethod::from_id(8).unwrap(), CompressionMethod::Deflate);
        assert!(matches!(
            CompressionMethod::from_id(14),
            Err(Error::UnsupportedMethod { method_id: 14 })
        ));
    }

    #[test]
    fn test_validate_level() {
        assert_eq!(validate_level(0).unwrap(), 0);
        assert_eq!(validate_level(9).unwrap(), 9);
        assert!(matches!(
            validate_level(10),
            Err(Error::InvalidCompressionLevel { level: 10 })
        ));
    }

    #[test]
    fn test_entry_encoder_roundtrip() {
        let data = b"entry encoder data ".repeat(200);
        for method in [CompressionMethod::Stored, CompressionMethod::Deflate] {
            let mut enc = EntryEncoder::new(method, 6, None, Vec::new()).unwrap();
            enc.write_all(&data).unwrap();
            let (compressed, crc) = enc.finish().unwrap();
            assert!(crc.is_none());

            let mut out = Vec::new();
            build_decoder(method, &compressed[..], data.len() as u64)
                .read_to_end(&mut out)
                .unwrap();
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_entry_encoder_parallel_reports_crc() {
        let data = vec![42u8; 300_000];
        let options = ParallelDeflateOptions::default().block_size(MIN_BLOCK_SIZE).threads(2);
        let mut enc = EntryEncoder::new(CompressionMethod::Deflate, 6, Some(&options), Vec::new()).unwrap();
        assert!(enc.is_parallel());
        enc.write_all(&data).unwrap();
        let (compressed, crc) = enc.finish().unwrap();
        assert_eq!(crc, Some(crc32fast::hash(&data)));

        let mut out = Vec::new();
        build_decoder(CompressionMethod::Deflate, &compressed[..], data.len() as u64)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_method_name() {
        assert_eq!(method::name(12), "BZip2");
        assert_eq!(CompressionMethod::Deflate.to_string(), "Deflate");
    }
}
