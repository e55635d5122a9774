//! Archive writing API for ZIP archives.
//!
//! [`Writer`] sequences entries through a small state machine:
//!
//! ```text
//! Closed --start_entry--> EntryOpen --write_entry--> Writing
//!   ^                                                   |
//!   +------------------- finish_entry (Sealed) <--------+
//! Closed --finish--> Finished
//! ```
//!
//! How an entry is sealed depends on the sink chosen at construction.
//! On a [`Seekable`] sink the local header is patched with the final CRC
//! and sizes. On a [`ForwardOnly`] sink the header carries flag bit 3 with
//! zeroed fields and a data descriptor follows the payload. Both layouts
//! decode identically.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Write};
//! use zipforge::write::{EntryOptions, Writer};
//! use zipforge::ArchivePath;
//!
//! let mut writer = Writer::create(Cursor::new(Vec::new()))?;
//! writer.add_bytes(ArchivePath::new("hello.txt")?, b"Hello, World!")?;
//!
//! writer.start_entry(ArchivePath::new("log.txt")?, EntryOptions::new())?;
//! writer.write_all(b"line 1\n")?;
//! writer.write_all(b"line 2\n")?;
//! writer.finish_entry()?;
//!
//! let result = writer.finish()?;
//! assert_eq!(result.entries_written, 2);
//! # Ok::<(), zipforge::Error>(())
//! ```

mod entry_input;
mod options;
mod pipeline;
mod raw_copy;
mod sink;
mod writer_init;

pub use options::{
    DEFAULT_BUFFER_SIZE, DEFAULT_PARALLEL_THRESHOLD, EntryMeta, EntryOptions, WriteOptions,
    WriteResult,
};
pub use sink::{ArchiveSink, ForwardOnly, Seekable};

use std::io::{self, Write};

use crate::codec::CompressionMethod;
use crate::crypto::{
    AesEncryptor, AesStrength, EncryptionMethod, ZipCryptoEncryptor, resolve_password,
};
use crate::directory::{ArchiveDirectory, ArchiveEntry, DOS_DIRECTORY_ATTRIBUTE};
use crate::format::{
    DataDescriptor, LocalFileHeader, LocalZip64, NtfsTimes, TimestampFormat, UnixTimes,
    Zip64Policy, flags, overflows_u32, version,
};
use crate::progress::{ProgressReporter, cancelled};
use crate::timestamp::{DosDateTime, Timestamp};
use crate::{ArchivePath, Error, Result};

use pipeline::{Cipher, CipherSink, EntryPipeline};

/// Unix file type bits.
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
/// Host system code for Unix in the high byte of "version made by".
const HOST_UNIX: u16 = 3;

/// State of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No entry is open; a new entry may be started or the archive finished.
    Closed,
    /// An entry header was written but no payload yet.
    EntryOpen,
    /// Payload bytes are flowing into the open entry.
    Writing,
    /// The open entry is being sealed. A writer stays here only if sealing
    /// failed.
    Sealed,
    /// The central directory was written.
    Finished,
}

/// The entry currently open for writing.
struct OpenEntry {
    name: String,
    position: usize,
    header: LocalFileHeader,
    header_offset: u64,
    pipeline: EntryPipeline,
    deferred: bool,
    known: Option<(u64, u32)>,
    size_hint: u64,
}

/// Upper bound of the stored size of `size` input bytes, allowing for
/// incompressible deflate blocks and encryption overhead.
fn worst_case_stored_size(size: u64, encryption: EncryptionMethod) -> u64 {
    size.saturating_add(size >> 12)
        .saturating_add(1024)
        .saturating_add(encryption.overhead())
}

/// ZIP archive writer.
///
/// Create one with [`Writer::create`] for `Write + Seek` destinations,
/// [`Writer::create_streaming`] for forward-only destinations, or
/// [`Writer::create_path`] for files.
pub struct Writer<S: ArchiveSink> {
    sink: S,
    options: WriteOptions,
    state: WriterState,
    directory: ArchiveDirectory<()>,
    current: Option<OpenEntry>,
    /// Name and header offset of the entry being written, kept until it is
    /// sealed or discarded.
    entry_start: Option<(String, u64)>,
    progress: Option<Box<dyn ProgressReporter>>,
    result: WriteResult,
}

impl<S: ArchiveSink> std::fmt::Debug for Writer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("state", &self.state)
            .field("position", &self.sink.position())
            .field("entries", &self.directory.len())
            .field("seekable", &self.sink.supports_patch())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: ArchiveSink> Writer<S> {
    /// Wraps an already constructed sink.
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink,
            options: WriteOptions::default(),
            state: WriterState::Closed,
            directory: ArchiveDirectory::new(),
            current: None,
            entry_start: None,
            progress: None,
            result: WriteResult::default(),
        }
    }

    /// Sets the write options.
    pub fn options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the write options.
    pub fn write_options(&self) -> &WriteOptions {
        &self.options
    }

    /// Installs a progress reporter.
    pub fn set_progress(&mut self, progress: Box<dyn ProgressReporter>) {
        self.progress = Some(progress);
    }

    /// Removes and returns the progress reporter.
    pub fn take_progress(&mut self) -> Option<Box<dyn ProgressReporter>> {
        self.progress.take()
    }

    /// Returns the current state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Returns true if headers are back-patched rather than followed by
    /// data descriptors.
    pub fn is_seekable(&self) -> bool {
        self.sink.supports_patch()
    }

    /// Returns the offset the next byte is written at.
    pub fn position(&self) -> u64 {
        self.sink.position()
    }

    /// Iterates over the entries sealed so far.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.directory.sealed_entries()
    }

    /// Returns true if an entry with this name was written or is open.
    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    fn ensure_state(&self, allowed: &[WriterState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "cannot {action}: writer is {:?}",
                self.state
            )))
        }
    }

    /// Opens a new entry.
    ///
    /// The local header is written immediately. Payload follows through
    /// [`write_entry`](Self::write_entry) or [`std::io::Write`], and
    /// [`finish_entry`](Self::finish_entry) seals it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the writer is `Closed`
    /// - [`Error::EntryExists`] if the name was already written
    /// - [`Error::PasswordRequired`] if the entry is encrypted without a password
    pub fn start_entry(&mut self, path: ArchivePath, options: EntryOptions) -> Result<()> {
        self.ensure_state(&[WriterState::Closed], "start an entry")?;
        if self.directory.contains(path.as_str()) {
            return Err(Error::EntryExists {
                path: path.into_string(),
            });
        }

        let is_dir = path.is_dir();
        let method = if is_dir {
            CompressionMethod::Stored
        } else {
            options.method.unwrap_or(self.options.method)
        };
        let level = options.level.unwrap_or(self.options.level);
        let encryption = if is_dir {
            EncryptionMethod::None
        } else {
            match (options.encryption, &options.password) {
                (Some(encryption), _) => encryption,
                (None, Some(_)) if !self.options.is_encrypted() => {
                    EncryptionMethod::Aes(AesStrength::Aes256)
                }
                (None, _) => self.options.effective_encryption(),
            }
        };
        let password = resolve_password(&[options.password.as_ref(), self.options.password.as_ref()]);
        if encryption.is_encrypted() && password.is_none() {
            return Err(Error::PasswordRequired {
                entry_name: path.into_string(),
            });
        }

        let deferred = !self.sink.supports_patch()
            || (encryption == EncryptionMethod::ZipCrypto && options.known.is_none());
        let mut entry = self.build_entry(&path, &options, method, encryption);
        if deferred {
            entry.flags |= flags::DATA_DESCRIPTOR;
        }
        if let Some((_, crc)) = options.known {
            entry.crc32 = crc;
        }

        let hint = options.known.map(|(size, _)| size).or(options.size_hint);
        let likely_overflow =
            hint.is_some_and(|size| overflows_u32(worst_case_stored_size(size, encryption)));
        let local_zip64 = match self.options.zip64 {
            Zip64Policy::Always => LocalZip64::Extra,
            Zip64Policy::Never => LocalZip64::None,
            Zip64Policy::AsNecessary if likely_overflow => LocalZip64::Extra,
            Zip64Policy::AsNecessary if deferred || options.known.is_some() => LocalZip64::None,
            Zip64Policy::AsNecessary => LocalZip64::Padding,
        };
        entry.zip64 = local_zip64 == LocalZip64::Extra;

        let cipher = match (encryption, password) {
            (EncryptionMethod::ZipCrypto, Some(password)) => {
                let (encryptor, header) =
                    ZipCryptoEncryptor::new(password, entry.zipcrypto_check_byte())?;
                CipherSink::new(Cipher::ZipCrypto(encryptor), header.to_vec())
            }
            (EncryptionMethod::Aes(strength), Some(password)) => {
                let (encryptor, header) = AesEncryptor::new(password, strength)?;
                CipherSink::new(Cipher::Aes(encryptor), header)
            }
            _ => CipherSink::new(Cipher::None, Vec::new()),
        };
        let parallel = match (method, self.options.parallel_threshold, options.size_hint) {
            (CompressionMethod::Deflate, Some(threshold), Some(size)) if size >= threshold => {
                Some(&self.options.parallel)
            }
            _ => None,
        };
        let pipeline = EntryPipeline::new(method, level, parallel, cipher)?;

        let header = LocalFileHeader {
            version_needed: entry.version_needed(),
            flags: entry.flags,
            method: entry.stored_method(),
            modified: entry.dos_time,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: entry.raw_name.clone(),
            extra: entry.extra_fields(),
            zip64: local_zip64,
        };
        let header_offset = self.sink.position();
        entry.local_header_offset = header_offset;
        header.write_to(&mut self.sink)?;

        log::debug!(
            "opened '{}' at {:#x}: {}, {}{}{}",
            entry.name,
            header_offset,
            method,
            encryption,
            if deferred { ", data descriptor" } else { "" },
            if pipeline.is_parallel() { ", parallel" } else { "" }
        );

        let name = entry.name.clone();
        let position = self.directory.begin_streaming(entry)?;
        let size_hint = hint.unwrap_or(0);
        if let Some(progress) = self.progress.as_mut() {
            progress.on_entry_start(&name, size_hint);
        }
        self.entry_start = Some((name.clone(), header_offset));
        self.current = Some(OpenEntry {
            name,
            position,
            header,
            header_offset,
            pipeline,
            deferred,
            known: options.known,
            size_hint,
        });
        self.state = WriterState::EntryOpen;
        Ok(())
    }

    fn build_entry(
        &self,
        path: &ArchivePath,
        options: &EntryOptions,
        method: CompressionMethod,
        encryption: EncryptionMethod,
    ) -> ArchiveEntry {
        let mut entry = ArchiveEntry::new(path.as_str());
        let meta = &options.meta;
        let is_dir = path.is_dir();

        entry.method_id = method.id();
        entry.encryption = encryption;
        if let EncryptionMethod::Aes(_) = encryption {
            entry.aes_version = Some(self.options.aes_version);
        }
        if path.needs_utf8_flag() {
            entry.flags |= flags::UTF8;
        }
        if encryption.is_encrypted() {
            entry.flags |= flags::ENCRYPTED;
        }

        let modified = meta.modified.unwrap_or_else(Timestamp::now);
        entry.dos_time = DosDateTime::from_timestamp(modified);
        if self.options.timestamps.contains(TimestampFormat::NTFS) {
            entry.ntfs_times = Some(NtfsTimes {
                modified,
                accessed: meta.accessed.unwrap_or(modified),
                created: meta.created.unwrap_or(modified),
            });
        }
        if self.options.timestamps.contains(TimestampFormat::UNIX) {
            entry.unix_times = Some(UnixTimes {
                modified: modified.as_unix_secs_i32(),
                accessed: meta.accessed.and_then(|t| t.as_unix_secs_i32()),
                created: meta.created.and_then(|t| t.as_unix_secs_i32()),
            });
        }

        let mut attributes = meta
            .attributes
            .unwrap_or(if is_dir { DOS_DIRECTORY_ATTRIBUTE } else { 0x20 });
        if is_dir {
            attributes |= DOS_DIRECTORY_ATTRIBUTE;
        }
        entry.external_attributes = attributes;
        if let Some(mode) = meta.unix_mode {
            let file_type = if is_dir { S_IFDIR } else { S_IFREG };
            let mode = if mode & S_IFMT == 0 { mode | file_type } else { mode };
            entry.version_made_by = (HOST_UNIX << 8) | version::MADE_BY;
            entry.external_attributes = (mode << 16) | (attributes & 0xFFFF);
        }

        if let Some(comment) = &options.comment {
            entry.comment = comment.clone();
        }
        entry
    }

    /// Writes payload bytes to the open entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no entry is open. An
    /// [`std::io::ErrorKind::Interrupted`] error means the progress reporter
    /// cancelled the operation.
    pub fn write_entry(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_state(&[WriterState::EntryOpen, WriterState::Writing], "write entry data")?;
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| Error::invalid_state("no entry is open"))?;
        current.pipeline.write(data, &mut self.sink)?;
        self.state = WriterState::Writing;

        let (bytes_in, bytes_out) = (current.pipeline.bytes_in(), current.pipeline.bytes_out());
        if let Some(streaming) = self.directory.streaming_mut(current.position) {
            streaming.bytes_in = bytes_in;
            streaming.bytes_out = bytes_out;
        }
        if let Some(progress) = self.progress.as_mut() {
            if !progress.on_progress(bytes_in, current.size_hint) {
                return Err(Error::Io(cancelled()));
            }
        }
        Ok(())
    }

    /// Seals the open entry and returns its final record.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if no entry is open
    /// - [`Error::Zip64Required`] if a size overflows under [`Zip64Policy::Never`]
    pub fn finish_entry(&mut self) -> Result<ArchiveEntry> {
        self.ensure_state(&[WriterState::EntryOpen, WriterState::Writing], "finish an entry")?;
        let current = self
            .current
            .take()
            .ok_or_else(|| Error::invalid_state("no entry is open"))?;
        self.state = WriterState::Sealed;

        let OpenEntry {
            name,
            position,
            mut header,
            header_offset,
            pipeline,
            deferred,
            known,
            ..
        } = current;
        let output = pipeline.finish(&mut self.sink)?;
        if let Some((size, crc)) = known {
            if size != output.bytes_in || crc != output.crc32 {
                return Err(Error::InvalidArgument(format!(
                    "content of '{name}' changed while it was written"
                )));
            }
        }

        let mut entry = self
            .directory
            .streaming_mut(position)
            .map(|s| s.entry.clone())
            .ok_or_else(|| Error::invalid_state(format!("'{name}' is not streaming")))?;
        entry.uncompressed_size = output.bytes_in;
        entry.compressed_size = output.bytes_out;
        entry.crc32 = if entry.has_crc() { output.crc32 } else { 0 };

        let overflow = overflows_u32(output.bytes_in) || overflows_u32(output.bytes_out);
        if overflow && self.options.zip64 == Zip64Policy::Never {
            return Err(Error::Zip64Required {
                field: "entry size",
                value: output.bytes_in.max(output.bytes_out),
            });
        }

        if deferred {
            let wide = header.zip64 == LocalZip64::Extra || overflow;
            DataDescriptor {
                crc32: entry.crc32,
                compressed_size: entry.compressed_size,
                uncompressed_size: entry.uncompressed_size,
            }
            .write_to(&mut self.sink, wide)?;
            entry.zip64 = wide;
        } else {
            if overflow && header.zip64 == LocalZip64::Padding {
                log::debug!("promoting '{}' to Zip64 in place", name);
                header.zip64 = LocalZip64::Extra;
            }
            entry.zip64 = header.zip64 == LocalZip64::Extra;
            header.version_needed = entry.version_needed();
            header.crc32 = entry.crc32;
            header.compressed_size = entry.compressed_size;
            header.uncompressed_size = entry.uncompressed_size;
            let encoded = header.encode()?;
            self.sink.patch(header_offset, &encoded)?;
        }

        self.directory.seal(position, entry.clone())?;
        self.record_sealed(&entry);
        self.entry_start = None;
        self.state = WriterState::Closed;
        Ok(entry)
    }

    fn record_sealed(&mut self, entry: &ArchiveEntry) {
        if entry.is_dir() {
            self.result.directories_written += 1;
        } else {
            self.result.entries_written += 1;
        }
        self.result.total_size += entry.uncompressed_size;
        self.result.compressed_size += entry.compressed_size;
        if let Some(progress) = self.progress.as_mut() {
            progress.on_ratio(entry.uncompressed_size, entry.compressed_size);
            progress.on_entry_complete(&entry.name, true);
        }
    }

    /// Discards the open entry, including a failed seal, and rewinds the
    /// sink to where its header started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no entry is open or the sink is
    /// forward-only.
    pub fn abort_entry(&mut self) -> Result<()> {
        self.ensure_state(
            &[WriterState::EntryOpen, WriterState::Writing, WriterState::Sealed],
            "discard an entry",
        )?;
        if !self.sink.supports_patch() {
            return Err(Error::invalid_state(
                "cannot discard an entry on a forward-only sink",
            ));
        }
        let (name, offset) = self
            .entry_start
            .take()
            .ok_or_else(|| Error::invalid_state("no entry is open"))?;
        self.current = None;
        self.sink.rewind_to(offset)?;
        self.directory.remove(&name);
        log::debug!("discarded '{}' at {:#x}", name, offset);
        if let Some(progress) = self.progress.as_mut() {
            progress.on_entry_complete(&name, false);
        }
        self.state = WriterState::Closed;
        Ok(())
    }
}

impl<S: ArchiveSink> Write for Writer<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_entry(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
