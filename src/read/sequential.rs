//! Forward-only reading through local headers.
//!
//! [`SequentialReader`] never seeks. It walks local headers from the front
//! and stops at the first central directory record, so it works on pipes
//! and sockets. Entries with deferred sizes (flag bit 3) are located by
//! scanning for a data descriptor whose compressed size equals the number
//! of bytes scanned; such payloads, and every AES payload, are buffered in
//! memory up to [`ReadLimits::max_buffered_entry`].

use std::io::{self, Cursor, Read, Seek, Write};

use crate::crypto::{AesEntryKeys, EncryptionMethod, ZipCryptoReader};
use crate::directory::ArchiveEntry;
use crate::error::unwrap_io;
use crate::format::{
    CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, DataDescriptor, EOCD_SIGNATURE,
    LOCAL_FILE_HEADER_SIGNATURE, LocalFileHeader, ZIP64_EOCD_SIGNATURE,
};
use crate::{Error, Password, READ_BUFFER_SIZE, Result};

use super::Archive;
use super::entry_reader::{EntryReader, check_declared_size, require_password};
use super::extraction::copy_decoded;
use super::options::{ReadLimits, ReadOptions};

/// A source that can take back bytes it over-read.
struct Lookahead<R> {
    inner: R,
    pushed: Vec<u8>,
    pushed_pos: usize,
    offset: u64,
}

impl<R: Read> Lookahead<R> {
    fn unread(&mut self, mut bytes: Vec<u8>) {
        self.offset -= bytes.len() as u64;
        bytes.extend_from_slice(&self.pushed[self.pushed_pos..]);
        self.pushed = bytes;
        self.pushed_pos = 0;
    }
}

impl<R: Read> Read for Lookahead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = if self.pushed_pos < self.pushed.len() {
            let available = &self.pushed[self.pushed_pos..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.pushed_pos += n;
            n
        } else {
            self.inner.read(buf)?
        };
        self.offset += n as u64;
        Ok(n)
    }
}

/// The undelivered stored bytes of the current entry.
struct RawPayload<'a, R> {
    source: &'a mut Lookahead<R>,
    remaining: &'a mut u64,
}

impl<R: Read> Read for RawPayload<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.remaining == 0 {
            return Ok(0);
        }
        let want = (*self.remaining).min(buf.len() as u64) as usize;
        let n = self.source.read(&mut buf[..want])?;
        *self.remaining -= n as u64;
        Ok(n)
    }
}

/// Reads the entries of an archive in stored order without seeking.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use zipforge::{ArchivePath, SequentialReader, Writer};
///
/// let mut writer = Writer::create_streaming(Vec::new())?;
/// writer.add_bytes(ArchivePath::new("a.txt")?, b"first")?;
/// writer.add_bytes(ArchivePath::new("b.txt")?, b"second")?;
/// let (_, bytes) = writer.finish_into_inner()?;
///
/// let mut reader = SequentialReader::new(bytes.as_slice());
/// while let Some(entry) = reader.next_entry()? {
///     let name = entry.entry().name.clone();
///     let data = entry.read_to_vec()?;
///     println!("{name}: {} bytes", data.len());
/// }
/// # Ok::<(), zipforge::Error>(())
/// ```
pub struct SequentialReader<R> {
    source: Lookahead<R>,
    options: ReadOptions,
    remaining: u64,
    entries_read: u64,
    finished: bool,
}

impl<R> std::fmt::Debug for SequentialReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialReader")
            .field("offset", &self.source.offset)
            .field("entries_read", &self.entries_read)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<R: Read> SequentialReader<R> {
    /// Creates a reader with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ReadOptions::default())
    }

    /// Creates a reader with a password for encrypted entries.
    pub fn with_password(reader: R, password: impl Into<Password>) -> Self {
        Self::with_options(reader, ReadOptions::new().password(password))
    }

    /// Creates a reader with custom options.
    pub fn with_options(reader: R, options: ReadOptions) -> Self {
        Self {
            source: Lookahead {
                inner: reader,
                pushed: Vec::new(),
                pushed_pos: 0,
                offset: 0,
            },
            options,
            remaining: 0,
            entries_read: 0,
            finished: false,
        }
    }

    /// Returns the number of entries returned so far.
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Returns the number of bytes consumed from the source.
    pub fn offset(&self) -> u64 {
        self.source.offset
    }

    /// Advances to the next entry.
    ///
    /// Whatever the previous entry's reader left unread is skipped.
    /// Returns `None` once the central directory is reached.
    ///
    /// # Errors
    ///
    /// Format errors for damaged headers or a source that ends before the
    /// central directory; password and authentication errors for
    /// encrypted entries whose payload is buffered.
    pub fn next_entry(&mut self) -> Result<Option<SequentialEntry<'_>>> {
        if self.finished {
            return Ok(None);
        }
        self.skip_remaining()?;

        let offset = self.source.offset;
        let mut signature = self.read_signature(offset)?;
        if signature == DATA_DESCRIPTOR_SIGNATURE && offset == 0 {
            // Single-segment marker left by some spanning writers.
            signature = self.read_signature(4)?;
        }
        let offset = self.source.offset - 4;
        match signature {
            LOCAL_FILE_HEADER_SIGNATURE => {}
            CENTRAL_DIRECTORY_SIGNATURE | ZIP64_EOCD_SIGNATURE | EOCD_SIGNATURE => {
                log::debug!("sequential read reached the directory at {:#x}", offset);
                self.finished = true;
                return Ok(None);
            }
            other => {
                return Err(Error::corrupt_header(
                    offset,
                    format!("expected a local file header, found {other:#010x}"),
                ));
            }
        }

        if self.entries_read >= self.options.limits.max_entries {
            return Err(Error::ResourceLimitExceeded(format!(
                "more than {} entries",
                self.options.limits.max_entries
            )));
        }
        let mut fixed = [0u8; LocalFileHeader::FIXED_LEN];
        fixed[..4].copy_from_slice(&signature.to_le_bytes());
        self.source
            .read_exact(&mut fixed[4..])
            .map_err(|e| truncated(e, offset, "local file header"))?;
        let header = LocalFileHeader::parse_after_fixed(&fixed, &mut self.source, offset)?;
        let mut entry = ArchiveEntry::from_local(header, offset)?;
        self.entries_read += 1;

        let limits = self.options.limits;
        let buffered = if entry.has_data_descriptor() {
            let (payload, descriptor) = self.scan_descriptor(&entry)?;
            entry.crc32 = descriptor.crc32;
            entry.compressed_size = descriptor.compressed_size;
            entry.uncompressed_size = descriptor.uncompressed_size;
            Some(payload)
        } else if matches!(entry.encryption, EncryptionMethod::Aes(_)) {
            Some(self.read_buffered(&entry)?)
        } else {
            None
        };
        check_declared_size(&entry, &limits)?;

        let method = entry.compression()?;
        let password = self.options.password.clone();
        let payload: Box<dyn Read + '_> = match buffered {
            Some(data) => open_buffered(&entry, data, password.as_ref())?,
            None => {
                self.remaining = entry.compressed_size;
                let raw = RawPayload {
                    source: &mut self.source,
                    remaining: &mut self.remaining,
                };
                match entry.encryption {
                    EncryptionMethod::ZipCrypto => {
                        let password = require_password(&entry, password.as_ref())?;
                        Box::new(ZipCryptoReader::new(
                            raw,
                            password,
                            entry.zipcrypto_check_byte(),
                            &entry.name,
                        )?)
                    }
                    _ => Box::new(raw),
                }
            }
        };
        let reader = EntryReader::new(&entry, method, payload, &limits, None);
        Ok(Some(SequentialEntry { entry, reader }))
    }

    fn read_signature(&mut self, offset: u64) -> Result<u32> {
        let mut sig = [0u8; 4];
        self.source.read_exact(&mut sig).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat(format!(
                    "archive ends at {offset:#x} without a central directory"
                ))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(u32::from_le_bytes(sig))
    }

    fn skip_remaining(&mut self) -> Result<()> {
        if self.remaining == 0 {
            return Ok(());
        }
        let expected = self.remaining;
        let skipped = io::copy(&mut Read::take(&mut self.source, expected), &mut io::sink())?;
        self.remaining = 0;
        if skipped != expected {
            return Err(Error::InvalidFormat(format!(
                "archive ends inside an entry payload ({skipped} of {expected} bytes)"
            )));
        }
        Ok(())
    }

    fn read_buffered(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        check_buffer_limit(entry.compressed_size, &self.options.limits)?;
        let mut data = vec![0u8; entry.compressed_size as usize];
        self.source
            .read_exact(&mut data)
            .map_err(|e| truncated(e, entry.local_header_offset, "entry payload"))?;
        Ok(data)
    }

    /// Reads until a data descriptor whose compressed size matches the
    /// bytes before it, returning the payload and the descriptor.
    fn scan_descriptor(&mut self, entry: &ArchiveEntry) -> Result<(Vec<u8>, DataDescriptor)> {
        let signature = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        let mut candidate = 0usize;
        let mut at_eof = false;
        loop {
            let window = if at_eof {
                DataDescriptor::encoded_len(false)
            } else {
                DataDescriptor::encoded_len(true)
            };
            while candidate + window <= buf.len() {
                if buf[candidate..candidate + 4] == signature {
                    if let Some((descriptor, len)) =
                        match_descriptor(&buf[candidate..], candidate as u64, entry.zip64)
                    {
                        let leftover = buf.split_off(candidate + len);
                        buf.truncate(candidate);
                        self.source.unread(leftover);
                        return Ok((buf, descriptor));
                    }
                }
                candidate += 1;
            }
            if at_eof {
                return Err(Error::InvalidFormat(format!(
                    "no data descriptor found for '{}'",
                    entry.name
                )));
            }
            check_buffer_limit(buf.len() as u64, &self.options.limits)?;
            match self.source.read(&mut chunk) {
                Ok(0) => at_eof = true,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Returns the underlying reader.
    ///
    /// Bytes read ahead while locating a data descriptor are lost.
    pub fn into_inner(self) -> R {
        self.source.inner
    }
}

impl<R: Read + Seek> SequentialReader<R> {
    /// Reopens the source as a random-access [`Archive`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once any byte has been consumed
    /// sequentially: the two access modes cannot share one source.
    pub fn into_archive(self) -> Result<Archive<R>> {
        if self.source.offset != 0 || self.entries_read != 0 {
            return Err(Error::invalid_state(format!(
                "cannot switch to random access after reading {} entries sequentially",
                self.entries_read
            )));
        }
        Archive::open_with_options(self.source.inner, self.options)
    }
}

fn truncated(e: io::Error, offset: u64, what: &str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::corrupt_header(offset, format!("truncated {what}"))
    } else {
        Error::Io(e)
    }
}

fn check_buffer_limit(len: u64, limits: &ReadLimits) -> Result<()> {
    if len > limits.max_buffered_entry {
        return Err(Error::ResourceLimitExceeded(format!(
            "payload larger than the {} byte sequential buffer",
            limits.max_buffered_entry
        )));
    }
    Ok(())
}

/// Parses a descriptor at the start of `window` if its compressed size is
/// `payload_len`. Zip64 entries try the wide layout first.
fn match_descriptor(window: &[u8], payload_len: u64, zip64: bool) -> Option<(DataDescriptor, usize)> {
    let u32_at = |i: usize| u32::from_le_bytes([window[i], window[i + 1], window[i + 2], window[i + 3]]);
    let u64_at = |i: usize| u64::from(u32_at(i)) | (u64::from(u32_at(i + 4)) << 32);
    let narrow = || {
        (window.len() >= DataDescriptor::encoded_len(false) && u64::from(u32_at(8)) == payload_len).then(|| {
            let descriptor = DataDescriptor {
                crc32: u32_at(4),
                compressed_size: payload_len,
                uncompressed_size: u64::from(u32_at(12)),
            };
            (descriptor, DataDescriptor::encoded_len(false))
        })
    };
    let wide = || {
        (window.len() >= DataDescriptor::encoded_len(true) && u64_at(8) == payload_len).then(|| {
            let descriptor = DataDescriptor {
                crc32: u32_at(4),
                compressed_size: payload_len,
                uncompressed_size: u64_at(16),
            };
            (descriptor, DataDescriptor::encoded_len(true))
        })
    };
    if zip64 { wide().or_else(narrow) } else { narrow().or_else(wide) }
}

/// Decrypts an in-memory payload. AES payloads are authenticated first.
fn open_buffered<'a>(
    entry: &ArchiveEntry,
    mut data: Vec<u8>,
    password: Option<&Password>,
) -> Result<Box<dyn Read + 'a>> {
    match entry.encryption {
        EncryptionMethod::None => Ok(Box::new(Cursor::new(data))),
        EncryptionMethod::ZipCrypto => {
            let password = require_password(entry, password)?;
            Ok(Box::new(ZipCryptoReader::new(
                Cursor::new(data),
                password,
                entry.zipcrypto_check_byte(),
                &entry.name,
            )?))
        }
        EncryptionMethod::Aes(strength) => {
            let password = require_password(entry, password)?;
            let mut header = data.as_slice();
            let keys = AesEntryKeys::from_reader(&mut header, password, strength, &entry.name)?;
            let mut body = data.split_off(strength.salt_len() + 2);
            keys.open_in_place(&mut body, &entry.name)?;
            Ok(Box::new(Cursor::new(body)))
        }
    }
}

/// One entry of a [`SequentialReader`], readable until the next call to
/// [`SequentialReader::next_entry`].
pub struct SequentialEntry<'a> {
    entry: ArchiveEntry,
    reader: EntryReader<'a>,
}

impl SequentialEntry<'_> {
    /// Returns the entry metadata as recovered from its local header and,
    /// for deferred entries, its data descriptor.
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }

    /// Reads and verifies the whole entry.
    pub fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.entry.uncompressed_size.min(16 * 1024 * 1024) as usize);
        self.reader.read_to_end(&mut out).map_err(unwrap_io)?;
        Ok(out)
    }

    /// Streams the entry into `out`, returning the bytes written.
    pub fn copy_to(&mut self, out: &mut dyn Write) -> Result<u64> {
        let total = self.entry.uncompressed_size;
        copy_decoded(&mut self.reader, out, total, &mut None)
    }
}

impl Read for SequentialEntry<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for SequentialEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialEntry")
            .field("name", &self.entry.name)
            .finish_non_exhaustive()
    }
}
