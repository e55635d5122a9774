//! Read, extraction and test options.

use crate::Password;
use crate::progress::ProgressReporter;
use crate::safety::{LimitedReader, TotalBudget};

pub use crate::safety::PathSafety;

/// Limits applied while parsing and decoding untrusted archives.
///
/// # Example
///
/// ```rust
/// use zipforge::read::ReadLimits;
///
/// let limits = ReadLimits::default().max_entry_size(1 << 20).max_ratio(200);
/// assert_eq!(limits.max_entry_size, 1 << 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Maximum number of entries the central directory may declare.
    pub max_entries: u64,
    /// Maximum decoded size of a single entry.
    pub max_entry_size: u64,
    /// Maximum decoded size across one extraction or test run.
    pub max_total_size: u64,
    /// Maximum ratio of decoded to stored bytes, if any.
    ///
    /// A single deflate layer cannot exceed about 1032:1, so the default
    /// leaves this unset and relies on the size limits.
    pub max_ratio: Option<u32>,
    /// Largest payload buffered in memory by the sequential reader.
    pub max_buffered_entry: u64,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_entry_size: 64 * 1024 * 1024 * 1024,
            max_total_size: 1024 * 1024 * 1024 * 1024,
            max_ratio: None,
            max_buffered_entry: 256 * 1024 * 1024,
        }
    }
}

impl ReadLimits {
    /// Creates limits with every check disabled.
    pub fn unlimited() -> Self {
        Self {
            max_entries: u64::MAX,
            max_entry_size: u64::MAX,
            max_total_size: u64::MAX,
            max_ratio: None,
            max_buffered_entry: u64::MAX,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: u64) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum decoded size of one entry.
    pub fn max_entry_size(mut self, max: u64) -> Self {
        self.max_entry_size = max;
        self
    }

    /// Sets the maximum decoded size of one operation.
    pub fn max_total_size(mut self, max: u64) -> Self {
        self.max_total_size = max;
        self
    }

    /// Sets the maximum decode ratio.
    pub fn max_ratio(mut self, ratio: u32) -> Self {
        self.max_ratio = Some(ratio);
        self
    }

    /// Sets the largest payload the sequential reader will buffer.
    pub fn max_buffered_entry(mut self, max: u64) -> Self {
        self.max_buffered_entry = max;
        self
    }

    /// Wraps a decoder of an entry stored in `compressed_size` bytes.
    pub(crate) fn wrap<R: std::io::Read>(
        &self,
        reader: R,
        compressed_size: u64,
        budget: Option<&TotalBudget>,
    ) -> LimitedReader<R> {
        let mut limited = LimitedReader::new(reader).max_bytes(self.max_entry_size);
        if let Some(ratio) = self.max_ratio {
            limited = limited.max_ratio(ratio, compressed_size);
        }
        if let Some(budget) = budget {
            limited = limited.budget(budget.clone());
        }
        limited
    }

    pub(crate) fn budget(&self) -> TotalBudget {
        TotalBudget::new(self.max_total_size)
    }
}

/// Options for opening an archive.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Password used for encrypted entries unless a call supplies its own.
    pub password: Option<Password>,
    /// Parsing and decoding limits.
    pub limits: ReadLimits,
}

impl ReadOptions {
    /// Creates default read options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the archive password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the read limits.
    pub fn limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Policy for handling existing files during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Return an error if the file exists.
    #[default]
    Error,
    /// Skip files that already exist.
    Skip,
    /// Overwrite existing files.
    Overwrite,
}

/// Options for extracting entries to a directory.
#[derive(Default)]
pub struct ExtractOptions {
    /// What to do with files that already exist.
    pub overwrite: OverwritePolicy,
    /// How entry names are validated against the destination.
    pub path_safety: PathSafety,
    /// Whether to restore modification times.
    pub preserve_mtime: bool,
    /// Password overriding the one given at open.
    pub password: Option<Password>,
    /// Progress reporter.
    pub progress: Option<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("overwrite", &self.overwrite)
            .field("path_safety", &self.path_safety)
            .field("preserve_mtime", &self.preserve_mtime)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExtractOptions {
    /// Creates default extraction options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }

    /// Restores entry modification times on extracted files.
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// Sets the password for encrypted entries.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets a progress reporter.
    pub fn progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Some(Box::new(reporter));
        self
    }
}
