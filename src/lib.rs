//! # zipforge
//!
//! A pure-Rust library for reading, writing and editing ZIP archives.
//!
//! This crate implements the PKZIP container format including the Zip64
//! extension, stored and deflated entries (with optional multi-threaded
//! deflate), traditional PKWARE encryption and WinZip AES-128/256, on both
//! seekable and forward-only destinations.
//!
//! ## Quick Start
//!
//! ### Reading an Archive
//!
//! ```rust,no_run
//! use zipforge::{Archive, ExtractOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("archive.zip")?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//!     }
//!
//!     archive.extract_to_dir("./output", (), ExtractOptions::default())?;
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use zipforge::{ArchivePath, Result, Writer};
//!
//! fn main() -> Result<()> {
//!     let mut writer = Writer::create_path("new.zip")?;
//!     writer.add_path("file.txt", ArchivePath::new("file.txt")?)?;
//!     writer.add_bytes(ArchivePath::new("hello.txt")?, b"Hello, World!")?;
//!
//!     let result = writer.finish()?;
//!     println!("Wrote {} entries ({:.1}% saved)",
//!         result.entries_written,
//!         result.space_savings() * 100.0);
//!     Ok(())
//! }
//! ```
//!
//! ### Encryption
//!
//! ```rust
//! use std::io::Cursor;
//! use zipforge::crypto::AesStrength;
//! use zipforge::{Archive, ArchivePath, WriteOptions, Writer};
//!
//! let options = WriteOptions::new().aes(AesStrength::Aes256).password("secret");
//! let mut writer = Writer::create(Cursor::new(Vec::new()))?.options(options);
//! writer.add_bytes(ArchivePath::new("secret.txt")?, b"Secret data")?;
//! let (_, cursor) = writer.finish_into_inner()?;
//!
//! let mut archive = Archive::open_with_password(Cursor::new(cursor.into_inner()), "secret")?;
//! assert_eq!(archive.read_entry("secret.txt")?, b"Secret data");
//! # Ok::<(), zipforge::Error>(())
//! ```
//!
//! ### Editing
//!
//! ```rust,no_run
//! use zipforge::{Result, ZipFile};
//!
//! fn main() -> Result<()> {
//!     let mut zip = ZipFile::open("archive.zip")?;
//!     zip.rename("old.txt", "new.txt")?;
//!     zip.update_bytes("VERSION", b"2".to_vec())?;
//!     zip.save()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | Yes | Multi-threaded deflate with Rayon |
//!
//! Without `parallel` the parallel writer runs its blocks on the calling
//! thread; the output format is the same.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. [`Error`] groups its variants into
//! format, integrity, state, I/O, duplicate and argument errors, with
//! predicates such as [`Error::is_format_error`]:
//!
//! ```rust,no_run
//! use zipforge::{Archive, Error};
//!
//! fn open_archive(path: &str) -> zipforge::Result<()> {
//!     match Archive::open_path(path) {
//!         Ok(archive) => {
//!             println!("Opened archive with {} entries", archive.len());
//!             Ok(())
//!         }
//!         Err(e) if e.is_format_error() => {
//!             eprintln!("Not a valid zip file: {e}");
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```
//!
//! ## Safety and Resource Limits
//!
//! - **Path traversal protection**: extraction refuses names that escape
//!   the destination
//! - **Resource limits**: [`ReadLimits`] caps entry counts and sizes
//! - **Integrity**: CRC-32 is verified for every entry, and the AES
//!   authentication code is checked before any decrypted byte is released
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (64 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod directory;
pub mod edit;
pub mod error;
pub mod format;
pub mod progress;
pub mod read;
pub mod safety;
pub mod timestamp;
pub mod write;

pub use archive_path::ArchivePath;
pub use error::{Error, Result};
pub use timestamp::{DosDateTime, Timestamp};

pub use codec::CompressionMethod;
pub use crypto::{AesStrength, EncryptionMethod, Password};
pub use directory::ArchiveEntry;
pub use format::{TimestampFormat, Zip64Policy};

// Re-export reading API at crate root for convenience
pub use read::{
    Archive, ArchiveInfo, EntryReader, EntrySelector, ExtractOptions, ExtractResult, ReadLimits,
    ReadOptions, SequentialEntry, SequentialReader, TestResult,
};

// Re-export writing API at crate root for convenience
pub use write::{EntryOptions, WriteOptions, WriteResult, Writer};

// Re-export edit API
pub use edit::{EntrySource, SaveErrorPolicy, SaveResult, ZipFile};

// Re-export safety utilities
pub use safety::{LimitedReader, PathSafety, validate_extract_path};

// Re-export progress API
pub use progress::{NoProgress, ProgressReporter, ProgressState, StatisticsProgress, progress_fn};
