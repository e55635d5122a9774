//! Extraction safety: destination path validation and decompression limits.
//!
//! Entry names come from untrusted input. Before anything is written to
//! disk, [`validate_extract_path`] maps an entry name onto the destination
//! directory, and [`LimitedReader`] stops a decoder that produces more
//! output than the configured limits allow.

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Policy for mapping entry names onto the extraction directory.
///
/// # Examples
///
/// ```rust
/// use zipforge::safety::PathSafety;
///
/// assert_eq!(PathSafety::default(), PathSafety::Strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Reject absolute names and `..` segments, and require the resolved
    /// path (symlinks followed) to stay inside the destination.
    #[default]
    Strict,
    /// Reject absolute names and `..` segments without resolving symlinks.
    Relaxed,
    /// Join names onto the destination unchecked.
    ///
    /// # Security Warning
    ///
    /// A name such as `../../home/user/.profile` escapes the destination.
    /// Use only for archives you created yourself.
    Disabled,
}

/// Maps an entry name to its extraction path under `dest_root`.
///
/// Backslashes are treated as separators, so names written by Windows
/// tools cannot smuggle `..\` past the check.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] if the name escapes `dest_root` under
/// `policy`, or an I/O error if `dest_root` cannot be resolved in
/// [`PathSafety::Strict`] mode.
pub fn validate_extract_path(name: &str, dest_root: &Path, policy: PathSafety) -> Result<PathBuf> {
    if policy == PathSafety::Disabled {
        return Ok(dest_root.join(name));
    }

    let traversal = || Error::PathTraversal {
        path: name.to_string(),
    };
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(traversal());
    }

    let mut full_path = dest_root.to_path_buf();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            s if s.contains('\0') => return Err(traversal()),
            s => full_path.push(s),
        }
    }
    if full_path == dest_root {
        return Err(traversal());
    }

    if policy == PathSafety::Strict {
        let root = dest_root.canonicalize()?;
        if !resolve_existing_prefix(&full_path)?.starts_with(&root) {
            log::warn!("entry '{}' resolves outside {}", name, root.display());
            return Err(traversal());
        }
    }
    Ok(full_path)
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Canonicalizes the deepest existing ancestor of `path` and re-appends
/// the components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    debug_assert!(!resolved.components().any(|c| c == Component::ParentDir));
    Ok(resolved)
}

/// A byte budget shared by every entry of one extraction.
#[derive(Debug, Clone)]
pub struct TotalBudget {
    used: Arc<AtomicU64>,
    limit: u64,
}

impl TotalBudget {
    /// Creates a budget of `limit` bytes.
    pub fn new(limit: u64) -> Self {
        Self {
            used: Arc::new(AtomicU64::new(0)),
            limit,
        }
    }

    /// Returns the bytes charged so far.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    fn charge(&self, n: u64) -> io::Result<()> {
        let total = self.used.fetch_add(n, Ordering::Relaxed) + n;
        if total > self.limit {
            return Err(io::Error::other(Error::ResourceLimitExceeded(format!(
                "total extracted size {} exceeds limit {}",
                total, self.limit
            ))));
        }
        Ok(())
    }
}

/// A reader that fails once its output exceeds the configured limits.
///
/// Limit violations surface as an [`io::Error`] wrapping
/// [`Error::ResourceLimitExceeded`].
pub struct LimitedReader<R> {
    inner: R,
    produced: u64,
    max_bytes: u64,
    compressed_size: u64,
    max_ratio: Option<u32>,
    budget: Option<TotalBudget>,
}

impl<R> LimitedReader<R> {
    /// Creates a reader with no limits set.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            produced: 0,
            max_bytes: u64::MAX,
            compressed_size: 0,
            max_ratio: None,
            budget: None,
        }
    }

    /// Sets the maximum output of this reader.
    pub fn max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = max;
        self
    }

    /// Limits output to `ratio` times `compressed_size`.
    ///
    /// A zero `compressed_size` disables the ratio check.
    pub fn max_ratio(mut self, ratio: u32, compressed_size: u64) -> Self {
        self.max_ratio = Some(ratio);
        self.compressed_size = compressed_size;
        self
    }

    /// Charges all output against a shared budget.
    pub fn budget(mut self, budget: TotalBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Returns the number of bytes produced so far.
    pub fn bytes_read(&self) -> u64 {
        self.produced
    }

    fn check_ratio(&self) -> io::Result<()> {
        let Some(ratio) = self.max_ratio else {
            return Ok(());
        };
        if self.compressed_size == 0 {
            return Ok(());
        }
        // Multiply rather than divide so the comparison is exact.
        if self.produced > u64::from(ratio).saturating_mul(self.compressed_size) {
            return Err(io::Error::other(Error::ResourceLimitExceeded(format!(
                "compression ratio above {}:1 ({} bytes from {})",
                ratio, self.produced, self.compressed_size
            ))));
        }
        Ok(())
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Ok(0);
        }
        self.produced += n as u64;
        if self.produced > self.max_bytes {
            return Err(io::Error::other(Error::ResourceLimitExceeded(format!(
                "entry size {} exceeds limit {}",
                self.produced, self.max_bytes
            ))));
        }
        self.check_ratio()?;
        if let Some(budget) = &self.budget {
            budget.charge(n as u64)?;
        }
        Ok(n)
    }
}

impl<R> std::fmt::Debug for LimitedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedReader")
            .field("produced", &self.produced)
            .field("max_bytes", &self.max_bytes)
            .field("max_ratio", &self.max_ratio)
            .finish_non_exhaustive()
    }
}
