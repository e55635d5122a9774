//! Entry name type with validation.
//!
//! ZIP stores entry names as forward-slash separated relative paths, with
//! directory entries marked by a trailing `/`. Names are limited to 65535
//! bytes because the header length field is 16 bits wide.

use crate::{Error, Result};
use std::fmt;

/// Maximum length for entry names (in bytes), bounded by the u16 length
/// field in local and central headers.
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// A validated entry name.
///
/// `ArchivePath` normalizes `\` separators to `/` and validates that:
/// - The name is not blank
/// - No NUL bytes are present
/// - The name is not absolute (does not start with `/`)
/// - No empty segments exist (no `//`); a single trailing `/` marks a directory
/// - No `.` or `..` segments are present
///
/// # Examples
///
/// ```
/// use zipforge::ArchivePath;
///
/// let path = ArchivePath::new("dir/file.txt").unwrap();
/// assert_eq!(path.as_str(), "dir/file.txt");
///
/// let dir = ArchivePath::new("dir\\sub/").unwrap();
/// assert_eq!(dir.as_str(), "dir/sub/");
/// assert!(dir.is_dir());
///
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Creates a new `ArchivePath` from a string, validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryName`] if the name is blank, too long,
    /// absolute, or contains NUL bytes, empty segments, `.` or `..`.
    pub fn new(s: &str) -> Result<Self> {
        let normalized = s.replace('\\', "/");
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Creates a directory name, appending the trailing `/` if missing.
    pub fn directory(s: &str) -> Result<Self> {
        let mut normalized = s.replace('\\', "/");
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    fn validate(s: &str) -> Result<()> {
        if s.trim().is_empty() {
            return Err(Error::InvalidEntryName("blank entry name".into()));
        }
        if s.contains('\0') {
            return Err(Error::InvalidEntryName("contains NUL byte".into()));
        }
        if s.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidEntryName(format!(
                "name exceeds maximum length of {} bytes",
                MAX_NAME_LENGTH
            )));
        }
        if s.starts_with('/') {
            return Err(Error::InvalidEntryName(format!("absolute path not allowed: {s}")));
        }

        let body = s.strip_suffix('/').unwrap_or(s);
        for segment in body.split('/') {
            match segment {
                "" => {
                    return Err(Error::InvalidEntryName(format!(
                        "empty segment (consecutive slashes): {s}"
                    )));
                }
                "." | ".." => {
                    return Err(Error::InvalidEntryName(format!(
                        "'{segment}' segment not allowed: {s}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this names a directory entry.
    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns the last component of the name, without a trailing `/`.
    pub fn file_name(&self) -> &str {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        match body.rfind('/') {
            Some(pos) => &body[pos + 1..],
            None => body,
        }
    }

    /// Returns the parent directory name (with trailing `/`), if any.
    pub fn parent(&self) -> Option<Self> {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.rfind('/').map(|pos| Self(body[..=pos].to_string()))
    }

    /// Returns `true` if the name requires the UTF-8 flag (bit 11).
    pub fn needs_utf8_flag(&self) -> bool {
        !self.0.is_ascii()
    }

    /// Consumes the path, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}
