//! ZIP record layouts, constants, and the header codec.
//!
//! This module encodes and decodes every fixed binary record of the format:
//!
//! | Record | Signature | Module |
//! |--------|-----------|--------|
//! | Local file header | `0x04034b50` | [`local`] |
//! | Data descriptor | `0x08074b50` | [`descriptor`] |
//! | Central directory header | `0x02014b50` | [`central`] |
//! | End of central directory | `0x06054b50` | [`eocd`] |
//! | Zip64 end of central directory locator | `0x07064b50` | [`eocd`] |
//! | Zip64 end of central directory record | `0x06064b50` | [`eocd`] |
//!
//! Extra fields live in [`extra`]. Decoding validates every signature and
//! reports mismatches or truncation as [`Error::CorruptHeader`] or
//! [`Error::InvalidFormat`]. Encoding consults a [`Zip64Policy`] to decide
//! between literal 32-bit fields and the `0xFFFFFFFF` sentinel backed by a
//! Zip64 extra field.
//!
//! [`Error::CorruptHeader`]: crate::Error::CorruptHeader
//! [`Error::InvalidFormat`]: crate::Error::InvalidFormat

pub mod central;
pub mod descriptor;
pub mod eocd;
pub mod extra;
pub mod local;
pub mod reader;

pub use central::CentralDirectoryHeader;
pub use descriptor::DataDescriptor;
pub use eocd::{CentralDirectoryEnd, EndOfCentralDirectory, Zip64EndLocator, Zip64EndRecord};
pub use extra::{AesExtra, ExtraFields, NtfsTimes, UnixTimes, Zip64Extra};
pub use local::{LocalFileHeader, LocalZip64};

use crate::{Error, Result};

/// Local file header signature.
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
/// Data descriptor signature.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
/// Central directory header signature.
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
/// End of central directory record signature.
pub const EOCD_SIGNATURE: u32 = 0x06054b50;
/// Zip64 end of central directory locator signature.
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;
/// Zip64 end of central directory record signature.
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x06064b50;

/// 32-bit sentinel meaning "the real value is in the Zip64 extra field".
pub const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;
/// 16-bit sentinel for entry counts and disk numbers.
pub const ZIP64_SENTINEL_U16: u16 = 0xFFFF;

/// Largest size or offset that still fits a 32-bit field.
pub const MAX_NARROW_U32: u64 = 0xFFFF_FFFE;
/// Largest entry count that still fits a 16-bit field.
pub const MAX_NARROW_U16: u64 = 0xFFFE;

/// General-purpose flag bits.
pub mod flags {
    /// Bit 0: the entry is encrypted.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bit 3: CRC and sizes follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Bit 6: strong encryption (not supported).
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    /// Bit 11: name and comment are UTF-8.
    pub const UTF8: u16 = 1 << 11;
    /// Bit 13: central directory is encrypted (not supported).
    pub const MASKED_HEADERS: u16 = 1 << 13;
}

/// "Version needed to extract" values.
pub mod version {
    /// Deflate, directories, ZipCrypto.
    pub const DEFAULT: u16 = 20;
    /// Zip64 structures present.
    pub const ZIP64: u16 = 45;
    /// WinZip AES.
    pub const AES: u16 = 51;
    /// Version made by: MS-DOS host, specification 4.5.
    pub const MADE_BY: u16 = 45;
}

/// Returns `true` if a size or offset does not fit a 32-bit field.
#[inline]
pub fn overflows_u32(value: u64) -> bool {
    value > MAX_NARROW_U32
}

/// Returns `true` if an entry count does not fit a 16-bit field.
#[inline]
pub fn overflows_u16(value: u64) -> bool {
    value > MAX_NARROW_U16
}

/// When to emit Zip64 structures.
///
/// # Example
///
/// ```rust
/// use zipforge::format::Zip64Policy;
///
/// assert_eq!(Zip64Policy::default(), Zip64Policy::AsNecessary);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Policy {
    /// Never emit Zip64; fail with [`Error::Zip64Required`] when a value
    /// overflows instead of truncating it.
    Never,
    /// Always emit Zip64 extra fields and the Zip64 end records.
    Always,
    /// Emit Zip64 only for fields that overflow.
    #[default]
    AsNecessary,
}

impl Zip64Policy {
    /// Decides whether a value must be widened, erroring under `Never`.
    pub fn widen(self, field: &'static str, value: u64, overflow: bool) -> Result<bool> {
        match self {
            Zip64Policy::Always => Ok(true),
            Zip64Policy::AsNecessary => Ok(overflow),
            Zip64Policy::Never if overflow => Err(Error::Zip64Required { field, value }),
            Zip64Policy::Never => Ok(false),
        }
    }
}

/// Which timestamp representations to write.
///
/// The MS-DOS fields are part of every header and are always written.
/// The NTFS and Unix extended timestamp extra fields are optional.
///
/// ```rust
/// use zipforge::format::TimestampFormat;
///
/// let all = TimestampFormat::NTFS | TimestampFormat::UNIX;
/// assert!(all.contains(TimestampFormat::UNIX));
/// assert!(!TimestampFormat::DOS.contains(TimestampFormat::NTFS));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimestampFormat(u8);

impl TimestampFormat {
    /// MS-DOS fields only.
    pub const DOS: Self = Self(0);
    /// Add the NTFS extra field (100 ns precision).
    pub const NTFS: Self = Self(1);
    /// Add the Unix extended timestamp extra field (1 s precision).
    pub const UNIX: Self = Self(2);

    /// Returns `true` if every representation in `other` is enabled.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self::NTFS
    }
}

impl std::ops::BitOr for TimestampFormat {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
