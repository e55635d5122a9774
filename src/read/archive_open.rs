//! Archive opening methods.
//!
//! Opening parses the end records and the whole central directory. Local
//! headers are read lazily when an entry is decoded.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::directory::{ArchiveDirectory, decode_text};
use crate::format::CentralDirectoryEnd;
use crate::{Error, Password, Result};

use super::options::ReadOptions;
use super::{Archive, ArchiveInfo};

impl Archive<BufReader<File>> {
    /// Opens an archive from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the archive is invalid.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with_options(path, ReadOptions::default())
    }

    /// Opens an archive from a file path, using `password` for encrypted
    /// entries.
    ///
    /// The password is not checked until an entry is decoded.
    pub fn open_path_with_password(
        path: impl AsRef<Path>,
        password: impl Into<Password>,
    ) -> Result<Self> {
        Self::open_path_with_options(path, ReadOptions::new().password(password))
    }

    /// Opens an archive from a file path with custom options.
    pub fn open_path_with_options(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open_with_options(BufReader::new(file), options)
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Opens an archive from a reader.
    ///
    /// # Errors
    ///
    /// Returns a format error if the end records or central directory are
    /// missing, truncated or inconsistent.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with_options(reader, ReadOptions::default())
    }

    /// Opens an archive from a reader, using `password` for encrypted
    /// entries.
    pub fn open_with_password(reader: R, password: impl Into<Password>) -> Result<Self> {
        Self::open_with_options(reader, ReadOptions::new().password(password))
    }

    /// Opens an archive from a reader with custom options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceLimitExceeded`] if the archive declares more
    /// entries than [`ReadLimits::max_entries`](super::ReadLimits::max_entries).
    pub fn open_with_options(mut reader: R, options: ReadOptions) -> Result<Self> {
        let (directory, end) = ArchiveDirectory::read(&mut reader, Some(options.limits.max_entries))?;
        check_offsets(&directory, &end)?;
        let info = build_info(&directory, &end);
        log::debug!(
            "opened archive: {} entries, central directory at {:#x}{}",
            info.entry_count,
            end.cd_offset,
            if end.zip64 { " (zip64)" } else { "" }
        );
        Ok(Self {
            reader,
            directory,
            info,
            options,
        })
    }

    /// Replaces the password used for encrypted entries.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        self.options.password = Some(password.into());
    }
}

/// Every payload must end before the central directory starts.
fn check_offsets(directory: &ArchiveDirectory<()>, end: &CentralDirectoryEnd) -> Result<()> {
    for entry in directory.sealed_entries() {
        let payload_end = entry
            .local_header_offset
            .checked_add(30)
            .and_then(|v| v.checked_add(entry.compressed_size));
        if payload_end.is_none_or(|v| v > end.cd_offset) {
            return Err(Error::corrupt_header(
                entry.local_header_offset,
                format!(
                    "entry '{}' ({} stored bytes) overlaps the central directory at {:#x}",
                    entry.name, entry.compressed_size, end.cd_offset
                ),
            ));
        }
    }
    Ok(())
}

fn build_info(directory: &ArchiveDirectory<()>, end: &CentralDirectoryEnd) -> ArchiveInfo {
    let mut info = ArchiveInfo {
        entry_count: directory.len(),
        is_zip64: end.zip64,
        comment: (!end.comment.is_empty()).then(|| decode_text(&end.comment, false)),
        prefix_len: end.cd_offset,
        ..Default::default()
    };
    for entry in directory.sealed_entries() {
        info.total_size = info.total_size.saturating_add(entry.uncompressed_size);
        info.packed_size = info.packed_size.saturating_add(entry.compressed_size);
        info.has_encrypted_entries |= entry.is_encrypted();
        info.prefix_len = info.prefix_len.min(entry.local_header_offset);
        if let Ok(method) = entry.compression() {
            if !info.compression_methods.contains(&method) {
                info.compression_methods.push(method);
            }
        }
    }
    info
}
