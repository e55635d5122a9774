//! Checksum computation utilities.
//!
//! ZIP protects every entry with a CRC-32 (IEEE 802.3 polynomial) computed
//! over the uncompressed bytes. This module wraps [`crc32fast`] with the
//! pieces the rest of the crate needs: incremental hashing, combination of
//! the block CRCs produced by parallel deflate, and a verifying reader.
//!
//! # Example
//!
//! ```rust
//! use zipforge::checksum::{Checksum, Crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), Crc32::compute(b"Hello, World!"));
//! ```

use std::io::{self, Read};

use crate::error::Error;

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the checksum computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// CRC-32 checksum calculator that also tracks the number of bytes hashed.
///
/// Tracking the length makes two calculators combinable: the CRC of a
/// concatenation can be derived from the CRCs and lengths of its parts.
///
/// ```rust
/// use zipforge::checksum::{Checksum, Crc32};
///
/// let mut head = Crc32::new();
/// head.update(b"Hello, ");
/// let mut tail = Crc32::new();
/// tail.update(b"World!");
/// head.combine(&tail);
/// assert_eq!(head.finalize(), Crc32::compute(b"Hello, World!"));
/// ```
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .field("len", &self.len)
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
            len: 0,
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl Crc32 {
    /// Creates a calculator that resumes from a known CRC over `len` bytes.
    pub fn with_initial(crc: u32, len: u64) -> Self {
        Self {
            hasher: crc32fast::Hasher::new_with_initial_len(crc, len),
            len,
        }
    }

    /// Returns the number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if no bytes have been hashed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends the checksum of data that logically follows this one.
    pub fn combine(&mut self, other: &Crc32) {
        self.hasher.combine(&other.hasher);
        self.len += other.len;
    }
}

/// Reader that validates the CRC-32 when it reaches the end of input.
///
/// A mismatch surfaces as an [`io::Error`] wrapping [`Error::CrcMismatch`].
/// Verification can be disabled for AE-2 entries, which store a zero CRC
/// and rely on the authentication code instead.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    expected: u32,
    verify: bool,
    entry_name: String,
}

impl<R> Crc32Reader<R> {
    /// Wraps `inner`, checking its output against `expected` at EOF.
    pub fn new(inner: R, expected: u32, verify: bool, entry_name: impl Into<String>) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            expected,
            verify,
            entry_name: entry_name.into(),
        }
    }

    /// Returns the CRC of everything read so far.
    pub fn current(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = self.inner.read(buf)?;
        if count == 0 {
            let actual = self.current();
            if self.verify && actual != self.expected {
                return Err(Error::crc_mismatch(&self.entry_name, self.expected, actual).into());
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}
