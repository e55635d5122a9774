//! Entries added or replaced since the last save.

use std::fmt;
use std::io::{self, Read};

use crate::directory::ArchiveEntry;
use crate::write::{ArchiveSink, EntryMeta, EntryOptions, Writer};
use crate::{ArchivePath, Error};

use super::source::{BytesSource, EntrySource};

/// Content waiting to be encoded by the next save.
pub(crate) struct PendingEntry {
    source: Box<dyn EntrySource>,
    options: EntryOptions,
    directory: bool,
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("options", &self.options)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

/// Why a pending entry was not written.
#[derive(Debug)]
pub(crate) enum WriteFailure {
    /// Opening or reading the content source failed.
    Source(Error),
    /// The archive could not take the entry.
    Archive(Error),
}

impl WriteFailure {
    pub(crate) fn into_error(self) -> Error {
        match self {
            WriteFailure::Source(e) | WriteFailure::Archive(e) => e,
        }
    }
}

/// Remembers whether the wrapped source failed.
struct TrackedRead<'a> {
    inner: &'a mut dyn Read,
    failed: bool,
}

impl Read for TrackedRead<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = true;
            }
        })
    }
}

impl PendingEntry {
    pub(crate) fn content(source: impl EntrySource + 'static, options: EntryOptions) -> Self {
        Self {
            source: Box::new(source),
            options,
            directory: false,
        }
    }

    pub(crate) fn directory(meta: EntryMeta) -> Self {
        Self {
            source: Box::new(BytesSource::new(Vec::new())),
            options: EntryOptions::new().meta(meta),
            directory: true,
        }
    }

    /// A stand-in entry so selectors can look at pending content.
    pub(crate) fn preview(&self, name: &str) -> ArchiveEntry {
        let mut entry = ArchiveEntry::new(name);
        entry.uncompressed_size = self.options.size_hint.or_else(|| self.source.size_hint()).unwrap_or(0);
        entry
    }

    /// Encodes the entry into `writer` under `name`.
    pub(crate) fn write<S: ArchiveSink>(
        &mut self,
        name: &str,
        writer: &mut Writer<S>,
    ) -> Result<ArchiveEntry, WriteFailure> {
        if self.directory {
            let path = ArchivePath::directory(name).map_err(WriteFailure::Archive)?;
            return writer
                .add_directory(path, self.options.meta.clone())
                .map_err(WriteFailure::Archive);
        }
        let path = ArchivePath::new(name).map_err(WriteFailure::Archive)?;

        let mut options = self.options.clone();
        let source_meta = self
            .source
            .meta()
            .map_err(|e| WriteFailure::Source(Error::Io(e)))?;
        let meta = &mut options.meta;
        meta.modified = meta.modified.or(source_meta.modified);
        meta.accessed = meta.accessed.or(source_meta.accessed);
        meta.created = meta.created.or(source_meta.created);
        meta.attributes = meta.attributes.or(source_meta.attributes);
        meta.unix_mode = meta.unix_mode.or(source_meta.unix_mode);
        if options.size_hint.is_none() {
            options.size_hint = self.source.size_hint();
        }

        if let Some(data) = self.source.as_bytes() {
            return writer
                .add_bytes_with(path, data, options)
                .map_err(WriteFailure::Archive);
        }

        let mut reader = self
            .source
            .open()
            .map_err(|e| WriteFailure::Source(Error::Io(e)))?;
        let mut tracked = TrackedRead {
            inner: &mut reader,
            failed: false,
        };
        match writer.add_stream(path, &mut tracked, options) {
            Ok(entry) => Ok(entry),
            Err(e) if tracked.failed => Err(WriteFailure::Source(e)),
            Err(e) => Err(WriteFailure::Archive(e)),
        }
    }
}
