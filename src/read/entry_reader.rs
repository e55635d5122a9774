//! The decode chain of one entry: decrypt, decompress, verify.
//!
//! AES payloads are authenticated over the whole ciphertext before the
//! reader is handed out, so a tampered entry never yields a byte.

use std::io::{self, Read, Seek, SeekFrom, Take};

use crate::checksum::Crc32Reader;
use crate::codec::{CompressionMethod, Decoder, build_decoder};
use crate::crypto::{AesDecryptReader, AesEntryKeys, EncryptionMethod, ZipCryptoReader};
use crate::directory::ArchiveEntry;
use crate::format::{LocalFileHeader, flags};
use crate::safety::{LimitedReader, TotalBudget};
use crate::{Error, Password, Result};

use super::Archive;
use super::options::ReadLimits;

/// Streams the decoded content of one entry.
///
/// The CRC-32 is checked when the end of the entry is reached; a mismatch
/// surfaces as an [`io::Error`] wrapping [`Error::CrcMismatch`]. A stream
/// the decoder rejects, or one that decodes to a length other than the
/// recorded size, surfaces as [`Error::CorruptData`].
pub struct EntryReader<'a> {
    inner: Crc32Reader<LimitedReader<Box<dyn Decoder + 'a>>>,
    name: String,
    expected: u64,
    produced: u64,
}

impl<'a> EntryReader<'a> {
    /// `payload` yields the decrypted compressed bytes of `entry`.
    pub(crate) fn new(
        entry: &ArchiveEntry,
        method: CompressionMethod,
        payload: Box<dyn Read + 'a>,
        limits: &ReadLimits,
        budget: Option<&TotalBudget>,
    ) -> Self {
        let decoder = build_decoder(method, payload, entry.uncompressed_size);
        let limited = limits.wrap(decoder, entry.compressed_size, budget);
        Self {
            inner: Crc32Reader::new(limited, entry.crc32, entry.has_crc(), entry.name.clone()),
            name: entry.name.clone(),
            expected: entry.uncompressed_size,
            produced: 0,
        }
    }

    /// Returns the entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the decoded size recorded in the archive.
    pub fn size(&self) -> u64 {
        self.expected
    }

    /// Returns the number of bytes produced so far.
    pub fn bytes_read(&self) -> u64 {
        self.produced
    }

    fn corrupt(&self, reason: String) -> io::Error {
        Error::CorruptData {
            entry_name: self.name.clone(),
            reason,
        }
        .into()
    }

    /// Decoder failures carry no crate error; they mean the stored stream
    /// is damaged. Crate errors and source I/O errors pass through.
    fn classify(&self, err: io::Error) -> io::Error {
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return err;
        }
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof => self.corrupt(err.to_string()),
            _ => err,
        }
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf).map_err(|e| self.classify(e))?;
        self.produced += n as u64;
        if self.produced > self.expected {
            return Err(self.corrupt(format!(
                "decodes to more than its recorded {} bytes",
                self.expected
            )));
        }
        if n == 0 && !buf.is_empty() && self.produced != self.expected {
            return Err(self.corrupt(format!(
                "ended after {} of {} bytes",
                self.produced, self.expected
            )));
        }
        Ok(n)
    }
}

impl std::fmt::Debug for EntryReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("name", &self.name)
            .field("expected", &self.expected)
            .field("produced", &self.produced)
            .finish_non_exhaustive()
    }
}

/// Returns the password for an encrypted entry.
pub(crate) fn require_password<'p>(
    entry: &ArchiveEntry,
    password: Option<&'p Password>,
) -> Result<&'p Password> {
    password.ok_or_else(|| Error::PasswordRequired {
        entry_name: entry.name.clone(),
    })
}

/// Rejects entries whose declared size already breaks the limits.
pub(crate) fn check_declared_size(entry: &ArchiveEntry, limits: &ReadLimits) -> Result<()> {
    if entry.uncompressed_size > limits.max_entry_size {
        return Err(Error::ResourceLimitExceeded(format!(
            "entry '{}' declares {} bytes, limit is {}",
            entry.name, entry.uncompressed_size, limits.max_entry_size
        )));
    }
    Ok(())
}

impl<R: Read + Seek> Archive<R> {
    /// Opens a streaming reader over the decoded content of an entry.
    ///
    /// # Errors
    ///
    /// - [`Error::EntryNotFound`] if no entry has this name
    /// - [`Error::PasswordRequired`] / [`Error::WrongPassword`] for
    ///   encrypted entries
    /// - [`Error::AuthenticationFailed`] if an AES payload was modified
    pub fn entry_reader(&mut self, name: &str) -> Result<EntryReader<'_>> {
        self.open_entry(name, None, None)
    }

    /// Like [`entry_reader`](Self::entry_reader), with a password that
    /// overrides the one given at open.
    pub fn entry_reader_with_password(
        &mut self,
        name: &str,
        password: &Password,
    ) -> Result<EntryReader<'_>> {
        self.open_entry(name, Some(password), None)
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<ArchiveEntry> {
        self.directory
            .sealed(name)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound {
                path: name.to_string(),
            })
    }

    pub(crate) fn open_entry(
        &mut self,
        name: &str,
        password: Option<&Password>,
        budget: Option<&TotalBudget>,
    ) -> Result<EntryReader<'_>> {
        let entry = self.lookup(name)?;
        let method = entry.compression()?;
        let limits = self.options.limits;
        check_declared_size(&entry, &limits)?;
        let password = password.cloned().or_else(|| self.options.password.clone());
        let start = self.seek_payload(&entry)?;
        let source = &mut self.reader;

        let payload: Box<dyn Read + '_> = match entry.encryption {
            EncryptionMethod::None => Box::new(Read::take(source, entry.compressed_size)),
            EncryptionMethod::ZipCrypto => {
                let password = require_password(&entry, password.as_ref())?;
                Box::new(ZipCryptoReader::new(
                    Read::take(source, entry.compressed_size),
                    password,
                    entry.zipcrypto_check_byte(),
                    &entry.name,
                )?)
            }
            EncryptionMethod::Aes(strength) => {
                let password = require_password(&entry, password.as_ref())?;
                let ciphertext_len = entry
                    .compressed_size
                    .checked_sub(strength.overhead())
                    .ok_or_else(|| {
                        Error::InvalidFormat(format!(
                            "entry '{}' is shorter than its AES framing",
                            entry.name
                        ))
                    })?;
                let keys = AesEntryKeys::from_reader(source, password, strength, &entry.name)?;
                keys.authenticate(source, ciphertext_len, &entry.name)?;
                let body = start + strength.salt_len() as u64 + 2;
                source.seek(SeekFrom::Start(body))?;
                Box::new(AesDecryptReader::new(Read::take(source, ciphertext_len), &keys)?)
            }
        };
        Ok(EntryReader::new(&entry, method, payload, &limits, budget))
    }

    /// Positions the source at the first payload byte of `entry`, checking
    /// its local header against the central record.
    pub(crate) fn seek_payload(&mut self, entry: &ArchiveEntry) -> Result<u64> {
        let offset = entry.local_header_offset;
        self.reader.seek(SeekFrom::Start(offset))?;
        let header = LocalFileHeader::read_from(&mut self.reader, offset)?;
        if header.name != entry.raw_name {
            return Err(Error::corrupt_header(
                offset,
                format!("local name disagrees with central entry '{}'", entry.name),
            ));
        }
        let deferred = (header.flags | entry.flags) & flags::DATA_DESCRIPTOR != 0;
        if !deferred
            && (header.compressed_size != entry.compressed_size
                || header.uncompressed_size != entry.uncompressed_size)
        {
            return Err(Error::corrupt_header(
                offset,
                format!(
                    "local sizes {}/{} of '{}' disagree with central {}/{}",
                    header.compressed_size,
                    header.uncompressed_size,
                    entry.name,
                    entry.compressed_size,
                    entry.uncompressed_size
                ),
            ));
        }
        Ok(self.reader.stream_position()?)
    }

    /// Returns the stored bytes of an entry, undecoded.
    pub(crate) fn raw_payload(&mut self, name: &str) -> Result<(ArchiveEntry, Take<&mut R>)> {
        let entry = self.lookup(name)?;
        self.seek_payload(&entry)?;
        let size = entry.compressed_size;
        Ok((entry, Read::take(&mut self.reader, size)))
    }
}
