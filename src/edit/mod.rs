//! Editing existing archives.
//!
//! [`ZipFile`] loads an archive, takes any number of additions, updates,
//! removals and renames, and writes a new archive on [`ZipFile::save`].
//!
//! - Renames and removals only touch the directory; stored bytes are
//!   copied as they are.
//! - Added and updated entries are encoded during the save, reading their
//!   content from an [`EntrySource`] opened at that moment.
//! - Saves to a path are atomic: a temporary file in the destination
//!   directory is renamed over the target only after it is complete.
//!
//! # Example
//!
//! ```rust
//! use zipforge::edit::{SaveErrorPolicy, ZipFile};
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("notes.zip");
//!
//! let mut zip = ZipFile::create(&path);
//! zip.add_bytes("a.txt", b"first".to_vec())?;
//! zip.add_directory("drafts")?;
//! zip.save()?;
//!
//! zip.rename("a.txt", "drafts/a.txt")?;
//! zip.set_error_policy(SaveErrorPolicy::Skip);
//! let result = zip.save()?;
//! assert_eq!(result.entries_copied, 2);
//! assert_eq!(zip.read_entry("drafts/a.txt")?, b"first");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod editor;
mod save;
mod source;
mod staged;

pub use editor::ZipFile;
pub use source::{BytesSource, EntrySource, FileSource, ReaderSource};

/// What a save does when the content of an added or updated entry cannot
/// be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveErrorPolicy {
    /// Fail the save and leave the destination untouched.
    #[default]
    Abort,
    /// Leave the entry out, log a warning and record it in
    /// [`SaveResult::skipped`].
    Skip,
}

/// Result of a save.
#[must_use = "save result should be checked for skipped entries"]
#[derive(Debug, Clone, Default)]
pub struct SaveResult {
    /// Entries copied from the previous archive without re-encoding.
    pub entries_copied: usize,
    /// Entries encoded from their content sources.
    pub entries_encoded: usize,
    /// Entries left out under [`SaveErrorPolicy::Skip`], with the reason.
    pub skipped: Vec<(String, String)>,
    /// Size of the written archive.
    pub archive_size: u64,
    /// Total uncompressed bytes.
    pub total_size: u64,
    /// Total stored bytes, encryption overhead included.
    pub compressed_size: u64,
    /// Whether any Zip64 structure was written.
    pub zip64: bool,
}

impl SaveResult {
    /// Returns the number of entries in the saved archive.
    pub fn total_entries(&self) -> usize {
        self.entries_copied + self.entries_encoded
    }

    /// Returns the compression ratio (compressed / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.total_size as f64
        }
    }
}
