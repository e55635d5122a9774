//! Entry input methods.
//!
//! This module provides methods for adding entries to an archive from
//! various sources: files, streams, and byte slices.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::directory::ArchiveEntry;
use crate::{ArchivePath, Error, Result};

use super::options::{EntryMeta, EntryOptions};
use super::sink::ArchiveSink;
use super::Writer;

impl<S: ArchiveSink> Writer<S> {
    /// Adds a file or directory from a filesystem path.
    ///
    /// The file is opened when this method runs and read in
    /// [`WriteOptions::buffer_size`](super::WriteOptions::buffer_size)
    /// chunks; it is never loaded whole.
    ///
    /// # Arguments
    ///
    /// * `disk_path` - Path to the file on disk
    /// * `archive_path` - Path within the archive
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the writer is in an invalid state.
    pub fn add_path(
        &mut self,
        disk_path: impl AsRef<Path>,
        archive_path: ArchivePath,
    ) -> Result<ArchiveEntry> {
        self.add_path_with(disk_path, archive_path, EntryOptions::new())
    }

    /// Adds a file from a filesystem path with per-entry options.
    ///
    /// Metadata read from the file fills any timestamp or attribute the
    /// options leave unset.
    pub fn add_path_with(
        &mut self,
        disk_path: impl AsRef<Path>,
        archive_path: ArchivePath,
        mut options: EntryOptions,
    ) -> Result<ArchiveEntry> {
        let disk_path = disk_path.as_ref();
        let metadata = std::fs::metadata(disk_path)?;
        let disk_meta = EntryMeta::from_metadata(&metadata);
        let meta = &mut options.meta;
        meta.modified = meta.modified.or(disk_meta.modified);
        meta.accessed = meta.accessed.or(disk_meta.accessed);
        meta.created = meta.created.or(disk_meta.created);
        meta.attributes = meta.attributes.or(disk_meta.attributes);
        meta.unix_mode = meta.unix_mode.or(disk_meta.unix_mode);

        if metadata.is_dir() {
            let archive_path = ArchivePath::directory(archive_path.as_str())?;
            return self.add_directory(archive_path, options.meta);
        }
        if options.size_hint.is_none() {
            options.size_hint = Some(metadata.len());
        }
        let file = File::open(disk_path)?;
        let mut reader = BufReader::with_capacity(self.options.buffer_size, file);
        self.add_stream(archive_path, &mut reader, options)
    }

    /// Adds a directory entry.
    ///
    /// The name gains a trailing `/` if it lacks one. Directories are
    /// always stored and never encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer is in an invalid state.
    pub fn add_directory(&mut self, archive_path: ArchivePath, meta: EntryMeta) -> Result<ArchiveEntry> {
        let archive_path = if archive_path.is_dir() {
            archive_path
        } else {
            ArchivePath::directory(archive_path.as_str())?
        };
        let options = EntryOptions::new().meta(meta).known_content(&[]);
        self.start_entry(archive_path, options)?;
        self.finish_entry()
    }

    /// Adds data from a stream.
    ///
    /// On a seekable sink a failing source discards the partial entry so
    /// the writer can continue; on a forward-only sink the writer is left
    /// in the failed state.
    ///
    /// # Arguments
    ///
    /// * `archive_path` - Path within the archive
    /// * `source` - Reader providing the data
    /// * `options` - Per-entry options
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails or if the writer is in an invalid state.
    pub fn add_stream(
        &mut self,
        archive_path: ArchivePath,
        source: &mut dyn Read,
        options: EntryOptions,
    ) -> Result<ArchiveEntry> {
        self.start_entry(archive_path, options)?;
        match self.copy_from(source).and_then(|()| self.finish_entry()) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                if self.sink.supports_patch() {
                    self.abort_entry()?;
                }
                Err(e)
            }
        }
    }

    fn copy_from(&mut self, source: &mut dyn Read) -> Result<()> {
        let mut buf = vec![0u8; self.options.buffer_size.max(1)];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            self.write_entry(&buf[..n])?;
        }
    }

    /// Adds data from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails or if the writer is in an invalid state.
    pub fn add_bytes(&mut self, archive_path: ArchivePath, data: &[u8]) -> Result<ArchiveEntry> {
        self.add_bytes_with(archive_path, data, EntryOptions::new())
    }

    /// Adds data from a byte slice with per-entry options.
    ///
    /// The CRC is computed up front, so encrypted entries never need a data
    /// descriptor on a seekable sink.
    pub fn add_bytes_with(
        &mut self,
        archive_path: ArchivePath,
        data: &[u8],
        options: EntryOptions,
    ) -> Result<ArchiveEntry> {
        self.start_entry(archive_path, options.known_content(data))?;
        let chunk = self.options.buffer_size.max(1);
        let written = data
            .chunks(chunk)
            .try_for_each(|piece| self.write_entry(piece))
            .and_then(|()| self.finish_entry());
        match written {
            Ok(entry) => Ok(entry),
            Err(e) => {
                if self.sink.supports_patch() {
                    self.abort_entry()?;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{WriteOptions, WriterState};
    use super::*;
    use std::io::Cursor;

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("disk on fire"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_add_stream_failure_discards_entry() {
        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
        writer.add_bytes(ArchivePath::new("ok.txt").unwrap(), b"ok").unwrap();
        let mark = writer.position();
        let mut source = FailingReader { remaining: 100 };
        let err = writer
            .add_stream(ArchivePath::new("bad.txt").unwrap(), &mut source, EntryOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(writer.state(), WriterState::Closed);
        assert_eq!(writer.position(), mark);
        assert_eq!(writer.entries().count(), 1);
    }

    #[test]
    fn test_add_stream_failure_on_forward_only_keeps_state() {
        let mut writer = Writer::create_streaming(Vec::new()).unwrap();
        let mut source = FailingReader { remaining: 10 };
        writer
            .add_stream(ArchivePath::new("bad.txt").unwrap(), &mut source, EntryOptions::new())
            .unwrap_err();
        assert_eq!(writer.state(), WriterState::Writing);
    }

    #[test]
    fn test_add_bytes_small_buffer_chunks() {
        let options = WriteOptions::new().buffer_size(3);
        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap().options(options);
        let entry = writer
            .add_bytes(ArchivePath::new("a.txt").unwrap(), b"0123456789")
            .unwrap();
        assert_eq!(entry.uncompressed_size, 10);
        assert_eq!(entry.crc32, crc32fast::hash(b"0123456789"));
    }

    #[test]
    fn test_add_path_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, b"from disk").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
        let entry = writer.add_path(&file, ArchivePath::new("data.txt").unwrap()).unwrap();
        assert_eq!(entry.uncompressed_size, 9);
        assert!(entry.modified().is_some());
        let entry = writer.add_path(&sub, ArchivePath::new("sub").unwrap()).unwrap();
        assert_eq!(entry.name, "sub/");
        assert!(entry.is_dir());
    }

    #[test]
    fn test_add_directory_normalizes_name() {
        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
        let entry = writer
            .add_directory(ArchivePath::new("docs").unwrap(), EntryMeta::new())
            .unwrap();
        assert_eq!(entry.name, "docs/");
    }
}
