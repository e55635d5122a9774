//! Content sources for entries added to a [`ZipFile`](super::ZipFile).
//!
//! A source is opened when the archive is saved, not when the entry is
//! added, and the handle it returns is dropped as soon as the entry is
//! written.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::write::EntryMeta;

/// Supplies the content of a new or updated entry.
pub trait EntrySource: Send {
    /// Opens the content for reading.
    ///
    /// Called once per save. Errors returned here, or by the returned
    /// reader, are source failures subject to the
    /// [`SaveErrorPolicy`](super::SaveErrorPolicy).
    fn open(&mut self) -> io::Result<Box<dyn Read + '_>>;

    /// Returns the expected content length, if known.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Returns timestamps and attributes for the entry.
    ///
    /// Values set explicitly in the entry options take precedence.
    fn meta(&self) -> io::Result<EntryMeta> {
        Ok(EntryMeta::new())
    }

    /// Returns the whole content when it is already in memory.
    ///
    /// In-memory content is written with a precomputed CRC, which keeps
    /// ZipCrypto entries free of data descriptors.
    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }
}

/// Content held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct BytesSource {
    data: Vec<u8>,
}

impl BytesSource {
    /// Wraps `data`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl fmt::Debug for BytesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesSource").field("len", &self.data.len()).finish()
    }
}

impl EntrySource for BytesSource {
    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.data.as_slice()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// A file on disk, opened only while its entry is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source for `path`. The file is not touched until a save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntrySource for FileSource {
    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size_hint(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    fn meta(&self) -> io::Result<EntryMeta> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(EntryMeta::from_metadata(&metadata))
    }
}

/// A one-shot reader.
///
/// The reader is consumed by the first save; opening it again fails with
/// [`io::ErrorKind::UnexpectedEof`].
pub struct ReaderSource<R> {
    reader: Option<R>,
    size_hint: Option<u64>,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wraps `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            size_hint: None,
        }
    }

    /// Announces the content length.
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

impl<R> fmt::Debug for ReaderSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSource")
            .field("consumed", &self.reader.is_none())
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

impl<R: Read + Send> EntrySource for ReaderSource<R> {
    fn open(&mut self) -> io::Result<Box<dyn Read + '_>> {
        match self.reader.take() {
            Some(reader) => Ok(Box::new(reader)),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream source was consumed by an earlier save",
            )),
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }
}
