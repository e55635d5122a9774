//! Archive entry metadata.

use crate::codec::{CompressionMethod, method};
use crate::crypto::{AesStrength, AesVendorVersion, EncryptionMethod};
use crate::format::extra::{AesExtra, ExtraFields, NtfsTimes, UnixTimes};
use crate::format::{CentralDirectoryHeader, LocalFileHeader, LocalZip64, flags, version};
use crate::timestamp::{DosDateTime, Timestamp};
use crate::{Error, Result};

/// MS-DOS directory attribute.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// MS-DOS archive attribute, set on regular files.
pub const DOS_ARCHIVE_ATTRIBUTE: u32 = 0x20;

/// An entry of a ZIP archive.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ArchiveEntry {
    /// The decoded entry name. Directories end with `/`.
    pub name: String,
    /// Compression method id of the payload (the real method for AES
    /// entries, not 99).
    pub method_id: u16,
    /// Encryption applied to the payload.
    pub encryption: EncryptionMethod,
    /// AES vendor version, for AES entries.
    pub aes_version: Option<AesVendorVersion>,
    /// Stored size, including encryption overhead.
    pub compressed_size: u64,
    /// Original size.
    pub uncompressed_size: u64,
    /// CRC-32 of the uncompressed data. Zero for AE-2 entries.
    pub crc32: u32,
    /// General-purpose flags.
    pub flags: u16,
    /// MS-DOS modification time (2 second resolution).
    pub dos_time: DosDateTime,
    /// NTFS timestamps, if present.
    pub ntfs_times: Option<NtfsTimes>,
    /// Unix extended timestamps, if present.
    pub unix_times: Option<UnixTimes>,
    /// Version made by.
    pub version_made_by: u16,
    /// Host-specific attributes.
    pub external_attributes: u32,
    /// Offset of the local file header.
    pub local_header_offset: u64,
    /// Per-entry comment.
    pub comment: String,
    /// Whether the local header carries a Zip64 extra field.
    pub zip64: bool,
    /// Name bytes as stored in the local header.
    pub(crate) raw_name: Vec<u8>,
    /// Extra fields this crate does not interpret.
    pub(crate) unknown_extra: Vec<(u16, Vec<u8>)>,
}

impl ArchiveEntry {
    /// Creates a blank file entry with the given name.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let raw_name = name.as_bytes().to_vec();
        Self {
            name,
            method_id: method::STORED,
            encryption: EncryptionMethod::None,
            aes_version: None,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            flags: 0,
            dos_time: DosDateTime::MIN,
            ntfs_times: None,
            unix_times: None,
            version_made_by: version::MADE_BY,
            external_attributes: DOS_ARCHIVE_ATTRIBUTE,
            local_header_offset: 0,
            comment: String::new(),
            zip64: false,
            raw_name,
            unknown_extra: Vec::new(),
        }
    }

    /// Replaces the name, re-encoding it as UTF-8 and flagging it when it
    /// is not plain ASCII.
    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.raw_name = name.as_bytes().to_vec();
        if name.is_ascii() {
            self.flags &= !flags::UTF8;
        } else {
            self.flags |= flags::UTF8;
        }
    }

    /// Builds an entry from a local header, for readers that never see the
    /// central directory. Host attributes and comments are unknown.
    pub(crate) fn from_local(header: LocalFileHeader, offset: u64) -> Result<Self> {
        let zip64 = header.zip64 == LocalZip64::Extra;
        let directory = header.name.last() == Some(&b'/');
        let central = CentralDirectoryHeader {
            version_made_by: version::DEFAULT,
            version_needed: header.version_needed,
            flags: header.flags,
            method: header.method,
            modified: header.modified,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: if directory { DOS_DIRECTORY_ATTRIBUTE } else { 0 },
            local_header_offset: offset,
            name: header.name,
            extra: header.extra,
            comment: Vec::new(),
        };
        let mut entry = Self::from_central(central, offset)?;
        entry.zip64 = zip64;
        Ok(entry)
    }

    /// Returns the last path component.
    pub fn file_name(&self) -> &str {
        let trimmed = self.name.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Returns true if this is a directory entry.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns true if this is a file entry.
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Returns true if the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_encrypted()
    }

    /// Returns true if the sizes and CRC follow the payload in a data
    /// descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & flags::DATA_DESCRIPTOR != 0
    }

    /// Returns the compression method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] for methods other than stored and
    /// deflate. Such entries can still be listed, copied and renamed.
    pub fn compression(&self) -> Result<CompressionMethod> {
        CompressionMethod::from_id(self.method_id)
    }

    /// Returns the best available modification time: NTFS, then Unix
    /// extended, then MS-DOS.
    pub fn modified(&self) -> Option<Timestamp> {
        if let Some(ntfs) = &self.ntfs_times {
            return Some(ntfs.modified);
        }
        if let Some(secs) = self.unix_times.and_then(|u| u.modified) {
            return Timestamp::from_unix_secs(i64::from(secs));
        }
        self.dos_time.to_timestamp()
    }

    /// Returns the Unix mode when the entry was made on a Unix host.
    pub fn unix_mode(&self) -> Option<u32> {
        if self.version_made_by >> 8 == 3 {
            Some(self.external_attributes >> 16)
        } else {
            None
        }
    }

    /// Returns whether the stored CRC is meaningful.
    ///
    /// AE-2 entries store zero and are protected by the AES MAC alone.
    pub fn has_crc(&self) -> bool {
        self.aes_version != Some(AesVendorVersion::Ae2)
    }

    /// The ZipCrypto check byte: the CRC high byte, or the high byte of
    /// the DOS time when the CRC was deferred to a data descriptor.
    pub(crate) fn zipcrypto_check_byte(&self) -> u8 {
        if self.has_data_descriptor() {
            (self.dos_time.time >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }

    /// Returns the stored method field (99 for AES).
    pub(crate) fn stored_method(&self) -> u16 {
        match self.encryption {
            EncryptionMethod::Aes(_) => method::AES,
            _ => self.method_id,
        }
    }

    /// Returns the version needed to extract this entry.
    pub(crate) fn version_needed(&self) -> u16 {
        if matches!(self.encryption, EncryptionMethod::Aes(_)) {
            version::AES
        } else if self.zip64 {
            version::ZIP64
        } else {
            version::DEFAULT
        }
    }

    /// Returns the AES extra field for AES entries.
    pub(crate) fn aes_extra(&self) -> Option<AesExtra> {
        match self.encryption {
            EncryptionMethod::Aes(strength) => Some(AesExtra {
                version: self.aes_version.unwrap_or_default(),
                strength,
                method: self.method_id,
            }),
            _ => None,
        }
    }

    /// Returns the extra fields shared by the local and central headers.
    pub(crate) fn extra_fields(&self) -> ExtraFields {
        ExtraFields {
            zip64: None,
            ntfs: self.ntfs_times,
            unix: self.unix_times,
            aes: self.aes_extra(),
            unknown: self.unknown_extra.clone(),
        }
    }

    /// Builds the central directory header for this entry.
    pub(crate) fn to_central(&self) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            version_made_by: self.version_made_by,
            version_needed: self.version_needed(),
            flags: self.flags,
            method: self.stored_method(),
            modified: self.dos_time,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: self.external_attributes,
            local_header_offset: self.local_header_offset,
            name: self.raw_name.clone(),
            extra: self.extra_fields(),
            comment: self.comment.as_bytes().to_vec(),
        }
    }

    /// Builds an entry from a parsed central directory header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFeature`] for strong encryption and
    /// [`Error::CorruptHeader`] for AES entries without their extra field.
    pub(crate) fn from_central(header: CentralDirectoryHeader, offset: u64) -> Result<Self> {
        if header.flags & (flags::STRONG_ENCRYPTION | flags::MASKED_HEADERS) != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "strong encryption",
            });
        }
        let utf8 = header.flags & flags::UTF8 != 0;
        let name = decode_text(&header.name, utf8);
        let comment = decode_text(&header.comment, utf8);

        let (method_id, encryption, aes_version) = if header.method == method::AES {
            let aes = header.extra.aes.ok_or_else(|| {
                Error::corrupt_header(offset, format!("entry '{name}' uses AES without an AES extra field"))
            })?;
            (aes.method, EncryptionMethod::Aes(aes.strength), Some(aes.version))
        } else if header.flags & flags::ENCRYPTED != 0 {
            (header.method, EncryptionMethod::ZipCrypto, None)
        } else {
            (header.method, EncryptionMethod::None, None)
        };

        let zip64 = header.compressed_size >= u64::from(u32::MAX)
            || header.uncompressed_size >= u64::from(u32::MAX);

        Ok(Self {
            name,
            method_id,
            encryption,
            aes_version,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            crc32: header.crc32,
            flags: header.flags,
            dos_time: header.modified,
            ntfs_times: header.extra.ntfs,
            unix_times: header.extra.unix,
            version_made_by: header.version_made_by,
            external_attributes: header.external_attributes,
            local_header_offset: header.local_header_offset,
            comment,
            zip64,
            raw_name: header.name,
            unknown_extra: header.extra.unknown,
        })
    }

    /// Returns the AES key strength, for AES entries.
    pub fn aes_strength(&self) -> Option<AesStrength> {
        match self.encryption {
            EncryptionMethod::Aes(strength) => Some(strength),
            _ => None,
        }
    }
}

/// Decodes a name or comment.
///
/// Bytes flagged as UTF-8 are decoded as such. Unflagged bytes are code
/// page 437 in theory; valid UTF-8 is accepted as-is since many tools omit
/// the flag, and anything else is mapped byte-for-byte to Latin-1.
pub(crate) fn decode_text(bytes: &[u8], utf8: bool) -> String {
    if utf8 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Zip64Policy;
    use crate::format::reader::ByteReader;

    fn file(name: &str) -> ArchiveEntry {
        let mut entry = ArchiveEntry::new(name);
        entry.method_id = method::DEFLATE;
        entry.crc32 = 0xAABBCCDD;
        entry.compressed_size = 10;
        entry.uncompressed_size = 20;
        entry
    }

    fn through_central(entry: &ArchiveEntry) -> ArchiveEntry {
        let mut out = Vec::new();
        entry.to_central().write(&mut out, Zip64Policy::AsNecessary).unwrap();
        let header = CentralDirectoryHeader::parse(&mut ByteReader::new(&out, 0)).unwrap();
        ArchiveEntry::from_central(header, 0).unwrap()
    }

    #[test]
    fn test_file_name_and_dir() {
        assert_eq!(file("a/b/c.txt").file_name(), "c.txt");
        assert_eq!(file("a/b/").file_name(), "b");
        assert!(file("a/b/").is_dir());
        assert!(file("a/b").is_file());
    }

    #[test]
    fn test_central_roundtrip() {
        let mut entry = file("docs/readme.txt");
        entry.comment = "note".into();
        assert_eq!(through_central(&entry), entry);
    }

    #[test]
    fn test_aes_roundtrip() {
        let mut entry = file("secret.bin");
        entry.encryption = EncryptionMethod::Aes(AesStrength::Aes256);
        entry.aes_version = Some(AesVendorVersion::Ae2);
        entry.flags = flags::ENCRYPTED;
        entry.crc32 = 0;
        assert_eq!(entry.to_central().method, 99);
        assert_eq!(entry.to_central().version_needed, version::AES);
        let parsed = through_central(&entry);
        assert_eq!(parsed.method_id, method::DEFLATE);
        assert_eq!(parsed.aes_strength(), Some(AesStrength::Aes256));
        assert!(!parsed.has_crc());
    }

    #[test]
    fn test_zipcrypto_detected_from_flag() {
        let mut entry = file("z.txt");
        entry.encryption = EncryptionMethod::ZipCrypto;
        entry.flags = flags::ENCRYPTED;
        assert_eq!(through_central(&entry).encryption, EncryptionMethod::ZipCrypto);
    }

    #[test]
    fn test_check_byte() {
        let mut entry = file("z.txt");
        entry.dos_time = DosDateTime::new(0x5000, 0xAB12);
        assert_eq!(entry.zipcrypto_check_byte(), 0xAA);
        entry.flags |= flags::DATA_DESCRIPTOR;
        assert_eq!(entry.zipcrypto_check_byte(), 0xAB);
    }

    #[test]
    fn test_aes_without_extra_is_corrupt() {
        let mut header = file("x").to_central();
        header.method = method::AES;
        assert!(matches!(
            ArchiveEntry::from_central(header, 5),
            Err(Error::CorruptHeader { offset: 5, .. })
        ));
    }

    #[test]
    fn test_strong_encryption_unsupported() {
        let mut header = file("x").to_central();
        header.flags |= flags::STRONG_ENCRYPTION;
        assert!(matches!(
            ArchiveEntry::from_central(header, 0),
            Err(Error::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_modified_preference() {
        let mut entry = file("t");
        entry.dos_time = DosDateTime::from_timestamp(Timestamp::from_unix_secs(1_000_000_000).unwrap());
        assert_eq!(entry.modified().unwrap().as_unix_secs(), 1_000_000_000);

        entry.unix_times = Some(UnixTimes {
            modified: Some(1_000_000_001),
            ..Default::default()
        });
        assert_eq!(entry.modified().unwrap().as_unix_secs(), 1_000_000_001);

        let ts = Timestamp::from_unix_secs(1_000_000_003).unwrap();
        entry.ntfs_times = Some(NtfsTimes {
            modified: ts,
            accessed: ts,
            created: ts,
        });
        assert_eq!(entry.modified(), Some(ts));
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text("héllo".as_bytes(), true), "héllo");
        assert_eq!(decode_text("héllo".as_bytes(), false), "héllo");
        assert_eq!(decode_text(&[b'a', 0xE9], false), "aé");
    }

    #[test]
    fn test_unsupported_method_listed() {
        let mut entry = file("x.bz2");
        entry.method_id = 12;
        let parsed = through_central(&entry);
        assert!(matches!(parsed.compression(), Err(Error::UnsupportedMethod { method_id: 12 })));
    }
}
