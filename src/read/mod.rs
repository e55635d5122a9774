//! Archive reading API.
//!
//! [`Archive`] reads a seekable source through its central directory and
//! decodes entries in any order. [`SequentialReader`] walks the local
//! headers of a forward-only source from the front.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use zipforge::{Archive, ArchivePath, Writer};
//!
//! let mut writer = Writer::create(Cursor::new(Vec::new()))?;
//! writer.add_bytes(ArchivePath::new("hello.txt")?, b"Hello, World!")?;
//! let (_, cursor) = writer.finish_into_inner()?;
//!
//! let mut archive = Archive::open(Cursor::new(cursor.into_inner()))?;
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//! assert_eq!(archive.read_entry("hello.txt")?, b"Hello, World!");
//! # Ok::<(), zipforge::Error>(())
//! ```

mod archive_open;
mod entry_reader;
mod extraction;
mod info;
mod options;
mod selector;
mod sequential;

pub use entry_reader::EntryReader;
pub use info::{ArchiveInfo, ExtractResult, TestResult};
pub use options::{ExtractOptions, OverwritePolicy, PathSafety, ReadLimits, ReadOptions};
pub use selector::{
    EntrySelector, SelectAll, SelectByName, SelectByPredicate, SelectByPrefix, SelectFilesOnly,
};
pub use sequential::{SequentialEntry, SequentialReader};

use std::io::{Read, Seek};

use crate::directory::{ArchiveDirectory, ArchiveEntry};

/// A ZIP archive opened for random access.
pub struct Archive<R> {
    pub(crate) reader: R,
    pub(crate) directory: ArchiveDirectory<()>,
    pub(crate) info: ArchiveInfo,
    pub(crate) options: ReadOptions,
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.directory.len())
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Returns information about the archive.
    pub fn info(&self) -> &ArchiveInfo {
        &self.info
    }

    /// Returns the entries in central directory order.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.directory.sealed_entries()
    }

    /// Returns the archive comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.info.comment.as_deref()
    }

    /// Returns the number of entries in the archive.
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Finds an entry by name.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.directory.sealed(name)
    }

    /// Returns true if an entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
