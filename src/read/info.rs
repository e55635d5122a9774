//! Archive information and operation results.

use crate::codec::CompressionMethod;

/// Information about an opened archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveInfo {
    /// Total number of entries (files and directories).
    pub entry_count: usize,
    /// Total uncompressed size of all entries.
    pub total_size: u64,
    /// Total stored size of all entries.
    pub packed_size: u64,
    /// Whether the archive has a Zip64 end record.
    pub is_zip64: bool,
    /// Whether any entry is encrypted.
    pub has_encrypted_entries: bool,
    /// Compression methods used in the archive.
    pub compression_methods: Vec<CompressionMethod>,
    /// Archive comment, if any.
    pub comment: Option<String>,
    /// Offset of the first byte of the archive within the source.
    pub prefix_len: u64,
}

impl ArchiveInfo {
    /// Returns the compression ratio (packed / unpacked).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.packed_size as f64 / self.total_size as f64
        }
    }

    /// Returns the space savings as a fraction.
    pub fn space_savings(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            1.0 - self.compression_ratio()
        }
    }
}

/// Result of an extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    /// Number of files written.
    pub entries_extracted: usize,
    /// Number of directories created.
    pub directories_created: usize,
    /// Number of entries skipped because the target existed.
    pub entries_skipped: usize,
    /// Total decoded bytes written.
    pub bytes_extracted: u64,
}

/// Result of an integrity test.
#[derive(Debug, Clone, Default)]
pub struct TestResult {
    /// Number of entries tested.
    pub entries_tested: usize,
    /// Number of entries that decoded and verified.
    pub entries_passed: usize,
    /// Number of entries that failed.
    pub entries_failed: usize,
    /// Failed entries with their error messages.
    pub failures: Vec<(String, String)>,
}

impl TestResult {
    /// Returns true if every tested entry passed.
    pub fn is_ok(&self) -> bool {
        self.entries_failed == 0
    }

    /// Returns true if any entry failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
