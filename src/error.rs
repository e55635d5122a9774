//! Error types for ZIP archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when working with ZIP archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use zipforge::{Archive, Result};
//!
//! fn read_readme(path: &str) -> Result<Vec<u8>> {
//!     let mut archive = Archive::open_path(path)?;
//!     archive.read_entry("README.md")
//! }
//! ```
//!
//! ## Error Classes
//!
//! Every variant belongs to one of a handful of classes that callers usually
//! care about more than the exact variant:
//!
//! ```rust
//! use zipforge::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     if error.is_format_error() {
//!         "the file is not a valid ZIP archive"
//!     } else if error.is_integrity_error() {
//!         "the archive content is damaged or was tampered with"
//!     } else if error.is_state_error() {
//!         "the API was used out of sequence"
//!     } else if error.is_argument_error() {
//!         "an invalid argument was supplied"
//!     } else {
//!         "the operation failed"
//!     }
//! }
//! ```

use std::io;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_name: &'a str,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CRC mismatch for entry '{}': expected {:#010x}, got {:#010x}",
            self.entry_name, self.expected, self.actual
        )
    }
}

/// The main error type for ZIP archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Sink or source failures |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`CorruptHeader`][Self::CorruptHeader], [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] | Bad or truncated records |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch], [`CorruptData`][Self::CorruptData], [`AuthenticationFailed`][Self::AuthenticationFailed] | Damaged or tampered payload |
/// | State | [`InvalidState`][Self::InvalidState] | Operation invoked out of sequence |
/// | Duplicate | [`EntryExists`][Self::EntryExists] | Adding a name twice |
/// | Argument | [`InvalidEntryName`][Self::InvalidEntryName], [`InvalidCompressionLevel`][Self::InvalidCompressionLevel], [`InvalidArgument`][Self::InvalidArgument] | Malformed configuration |
/// | Encryption | [`WrongPassword`][Self::WrongPassword], [`PasswordRequired`][Self::PasswordRequired] | Password problems |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred in the sink, the source archive, or an entry
    /// content source. The underlying error is surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data is not a ZIP archive or a required record is missing.
    #[error("Invalid ZIP format: {0}")]
    InvalidFormat(String),

    /// A record has a bad signature, is truncated, or contains values that
    /// are inconsistent with the rest of the archive.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset of the record where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The entry uses a compression method this crate cannot decode.
    ///
    /// Supported methods are `0` (stored) and `8` (deflate). Method `99`
    /// marks WinZip AES and is resolved through the AES extra field.
    #[error("Unsupported compression method: {method_id}")]
    UnsupportedMethod {
        /// The ZIP compression method identifier.
        method_id: u16,
    },

    /// The archive uses a feature this crate does not implement, such as
    /// split archives or strong encryption.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The CRC-32 of the decompressed data does not match the stored value.
    #[error("{}", CrcMismatchDisplay { entry_name, expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry name.
        entry_name: String,
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC of the data that was produced.
        actual: u32,
    },

    /// The compressed stream of an entry is damaged: the decoder rejected
    /// it, or it decodes to a length other than the recorded size.
    #[error("Corrupt data in entry '{entry_name}': {reason}")]
    CorruptData {
        /// The entry name.
        entry_name: String,
        /// What the decoder reported.
        reason: String,
    },

    /// The WinZip AES authentication code did not verify.
    ///
    /// The ciphertext or its trailing authentication code was modified.
    /// No plaintext is released when this error is returned.
    #[error("Authentication failed for entry '{entry_name}'")]
    AuthenticationFailed {
        /// The entry name.
        entry_name: String,
    },

    /// The password does not match the one used to encrypt the entry.
    ///
    /// Detected through the ZipCrypto check byte or the AES password
    /// verification value.
    #[error("Wrong password for entry '{entry_name}'")]
    WrongPassword {
        /// The entry name.
        entry_name: String,
    },

    /// The entry is encrypted but no password is available.
    #[error("Password required for encrypted entry '{entry_name}'")]
    PasswordRequired {
        /// The entry name.
        entry_name: String,
    },

    /// An operation was invoked out of sequence.
    ///
    /// Examples include writing before an entry is opened, opening a second
    /// entry while one is still open, reading an entry that has not been
    /// saved yet, or switching a sequential reader to random access after it
    /// consumed entries. This is always a programming error of the caller.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An entry with this name is already present.
    #[error("Entry already exists: {path}")]
    EntryExists {
        /// The duplicated entry name.
        path: String,
    },

    /// No entry with this name exists.
    #[error("Entry not found: {path}")]
    EntryNotFound {
        /// The missing entry name.
        path: String,
    },

    /// An entry name is blank or otherwise unusable.
    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    /// A compression level outside 0-9 was requested.
    ///
    /// ```rust
    /// use zipforge::{Error, write::WriteOptions};
    ///
    /// assert!(WriteOptions::new().level(9).is_ok());
    /// let result = WriteOptions::new().level(15);
    /// assert!(matches!(result, Err(Error::InvalidCompressionLevel { level: 15 })));
    /// ```
    #[error("invalid compression level {level}: must be 0-9")]
    InvalidCompressionLevel {
        /// The invalid level that was provided.
        level: u32,
    },

    /// A configuration value is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value overflows its 32-bit field and the Zip64 policy is
    /// [`Zip64Policy::Never`](crate::format::Zip64Policy::Never).
    #[error("{field} value {value} requires Zip64 but Zip64 is disabled")]
    Zip64Required {
        /// The field that overflowed.
        field: &'static str,
        /// The value that does not fit.
        value: u64,
    },

    /// A configured read limit was exceeded.
    ///
    /// This protects against archives that decompress to extremely large
    /// sizes or declare huge entry counts.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// An entry path would escape the extraction directory.
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The offending path.
        path: String,
    },
}

impl Error {
    /// Returns `true` for malformed, truncated or unsupported archive data.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::CorruptHeader { .. }
                | Error::UnsupportedMethod { .. }
                | Error::UnsupportedFeature { .. }
        )
    }

    /// Returns `true` when decoded content failed verification.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Error::CrcMismatch { .. }
                | Error::CorruptData { .. }
                | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns `true` for operations invoked out of sequence.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }

    /// Returns `true` for invalid caller-supplied arguments.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidEntryName(_)
                | Error::InvalidCompressionLevel { .. }
                | Error::InvalidArgument(_)
        )
    }

    /// Returns `true` if this is an encryption-related error.
    pub fn is_encryption_error(&self) -> bool {
        matches!(
            self,
            Error::WrongPassword { .. }
                | Error::PasswordRequired { .. }
                | Error::AuthenticationFailed { .. }
        )
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::CrcMismatch { entry_name, .. }
            | Error::CorruptData { entry_name, .. }
            | Error::AuthenticationFailed { entry_name }
            | Error::WrongPassword { entry_name }
            | Error::PasswordRequired { entry_name } => Some(entry_name),
            Error::EntryExists { path }
            | Error::EntryNotFound { path }
            | Error::PathTraversal { path } => Some(path),
            _ => None,
        }
    }

    /// Creates a CrcMismatch error.
    pub fn crc_mismatch(entry_name: impl Into<String>, expected: u32, actual: u32) -> Self {
        Error::CrcMismatch {
            entry_name: entry_name.into(),
            expected,
            actual,
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Error::InvalidState(reason.into())
    }
}

/// Converts an error into an [`io::Error`] so it can travel through
/// `std::io::Read` / `Write` implementations.
impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Recovers a crate error previously wrapped by `From<Error> for io::Error`.
pub(crate) fn unwrap_io(err: io::Error) -> Error {
    if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
            None => Error::Io(io::Error::from(io::ErrorKind::InvalidData)),
        }
    } else {
        Error::Io(err)
    }
}

/// A specialized Result type for ZIP operations.
pub type Result<T> = std::result::Result<T, Error>;
