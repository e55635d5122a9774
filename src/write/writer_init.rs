//! Writer initialization and finalization.
//!
//! This module provides methods for creating writers over each kind of
//! sink and for writing the central directory that finishes an archive.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::Result;

use super::options::WriteResult;
use super::sink::{ArchiveSink, ForwardOnly, Seekable};
use super::{Writer, WriterState};

impl<W: Write + Seek> Writer<Seekable<W>> {
    /// Creates a new archive writer over a seekable destination.
    ///
    /// The archive starts at the destination's current position. Local
    /// headers are back-patched once each entry is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial position cannot be read.
    pub fn create(sink: W) -> Result<Self> {
        Ok(Self::with_sink(Seekable::new(sink)?))
    }
}

impl<W: Write> Writer<ForwardOnly<W>> {
    /// Creates a new archive writer over a forward-only destination.
    ///
    /// Entries carry data descriptors instead of back-patched headers.
    ///
    /// # Errors
    ///
    /// This constructor does not fail today; it returns `Result` for
    /// symmetry with [`Writer::create`].
    pub fn create_streaming(sink: W) -> Result<Self> {
        Ok(Self::with_sink(ForwardOnly::new(sink)))
    }
}

impl Writer<Seekable<BufWriter<File>>> {
    /// Creates a new archive file at the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the archive file to create
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::create(BufWriter::new(file))
    }
}

impl<S: ArchiveSink> Writer<S> {
    /// Finishes writing the archive.
    ///
    /// # Returns
    ///
    /// A WriteResult with statistics about the written archive.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is still open or if the central
    /// directory cannot be written.
    pub fn finish(self) -> Result<WriteResult> {
        let (result, _sink) = self.finish_into_inner()?;
        Ok(result)
    }

    /// Finishes writing the archive and returns the underlying sink.
    ///
    /// This is useful when you need access to the written data, such as
    /// when writing to a `Cursor<Vec<u8>>` and need to retrieve the buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`](crate::Error::InvalidState) if an entry is open
    /// - [`Error::Zip64Required`](crate::Error::Zip64Required) if the archive
    ///   needs Zip64 under [`Zip64Policy::Never`](crate::format::Zip64Policy::Never)
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::io::Cursor;
    /// use zipforge::{ArchivePath, Writer};
    ///
    /// let mut writer = Writer::create(Cursor::new(Vec::new()))?;
    /// writer.add_bytes(ArchivePath::new("test.txt")?, b"Hello")?;
    /// let (result, cursor) = writer.finish_into_inner()?;
    /// assert_eq!(result.archive_size, cursor.into_inner().len() as u64);
    /// # Ok::<(), zipforge::Error>(())
    /// ```
    pub fn finish_into_inner(mut self) -> Result<(WriteResult, S::Inner)> {
        self.ensure_state(&[WriterState::Closed], "finish the archive")?;

        let cd_offset = self.sink.position();
        let comment = self.options.comment.clone().unwrap_or_default();
        let summary = self.directory.write_central_directory(
            &mut self.sink,
            cd_offset,
            comment.as_bytes(),
            self.options.zip64,
        )?;
        self.sink.flush()?;
        self.state = WriterState::Finished;

        self.result.archive_size = self.sink.position();
        if self.sink.high_water() > self.result.archive_size {
            log::warn!(
                "{} discarded bytes follow the archive; truncate the output to {} bytes",
                self.sink.high_water() - self.result.archive_size,
                self.result.archive_size
            );
        }
        self.result.zip64 = summary.zip64 || self.directory.sealed_entries().any(|e| e.zip64);
        log::debug!(
            "finished archive: {} entries, {} bytes",
            summary.entries,
            self.result.archive_size
        );
        Ok((self.result, self.sink.into_inner()))
    }
}
