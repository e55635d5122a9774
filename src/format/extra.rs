//! Extra field parsing and encoding.
//!
//! Extra fields are a sequence of `id: u16, size: u16, data[size]` blocks
//! appended to local and central headers. This crate understands:
//!
//! | ID | Field |
//! |----|-------|
//! | `0x0001` | Zip64 extended information |
//! | `0x000a` | NTFS timestamps |
//! | `0x5455` | Unix extended timestamp |
//! | `0x9901` | WinZip AES encryption descriptor |
//!
//! Unknown fields are preserved verbatim so they survive a rewrite.

use super::reader::{ByteReader, PutLe};
use crate::crypto::{AesStrength, AesVendorVersion};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Zip64 extended information.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
/// NTFS timestamps.
pub const NTFS_EXTRA_ID: u16 = 0x000a;
/// Unix extended timestamp.
pub const UNIX_TIME_EXTRA_ID: u16 = 0x5455;
/// WinZip AES descriptor.
pub const AES_EXTRA_ID: u16 = 0x9901;
/// Reserved padding written into local headers whose sizes are not known
/// yet; rewritten into a Zip64 field in place if the sizes overflow.
pub const PADDING_EXTRA_ID: u16 = 0x9999;

/// Total length (header included) of the padding field. Matches a Zip64
/// field holding both sizes so the two can be swapped in place.
pub const PADDING_EXTRA_LEN: usize = 20;

const NTFS_TIME_TAG: u16 = 0x0001;

/// Zip64 extended information extra field.
///
/// Only the values whose narrow field holds the sentinel are present, in the
/// fixed order uncompressed size, compressed size, header offset, disk start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extra {
    /// Uncompressed size.
    pub uncompressed_size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Local header offset.
    pub header_offset: Option<u64>,
    /// Disk number where the entry starts.
    pub disk_start: Option<u32>,
}

impl Zip64Extra {
    /// Returns `true` if no value is present.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size.is_none()
            && self.compressed_size.is_none()
            && self.header_offset.is_none()
            && self.disk_start.is_none()
    }

    /// Appends the field (header included) to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut data = Vec::with_capacity(28);
        if let Some(v) = self.uncompressed_size {
            data.put_u64(v);
        }
        if let Some(v) = self.compressed_size {
            data.put_u64(v);
        }
        if let Some(v) = self.header_offset {
            data.put_u64(v);
        }
        if let Some(v) = self.disk_start {
            data.put_u32(v);
        }
        out.put_u16(ZIP64_EXTRA_ID);
        out.put_u16(data.len() as u16);
        out.extend_from_slice(&data);
    }

    /// Decodes the field, reading only the values flagged as wanted.
    pub fn parse(
        data: &[u8],
        base: u64,
        want_uncompressed: bool,
        want_compressed: bool,
        want_offset: bool,
        want_disk: bool,
    ) -> Result<Self> {
        let mut r = ByteReader::new(data, base);
        let mut extra = Zip64Extra::default();
        if want_uncompressed {
            extra.uncompressed_size = Some(r.u64()?);
        }
        if want_compressed {
            extra.compressed_size = Some(r.u64()?);
        }
        if want_offset {
            extra.header_offset = Some(r.u64()?);
        }
        if want_disk {
            extra.disk_start = Some(r.u32()?);
        }
        Ok(extra)
    }
}

/// NTFS timestamps (FILETIME, 100 ns resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimes {
    /// Last modification time.
    pub modified: Timestamp,
    /// Last access time.
    pub accessed: Timestamp,
    /// Creation time.
    pub created: Timestamp,
}

impl NtfsTimes {
    fn write(&self, out: &mut Vec<u8>) {
        out.put_u16(NTFS_EXTRA_ID);
        out.put_u16(32);
        out.put_u32(0);
        out.put_u16(NTFS_TIME_TAG);
        out.put_u16(24);
        out.put_u64(self.modified.as_filetime());
        out.put_u64(self.accessed.as_filetime());
        out.put_u64(self.created.as_filetime());
    }

    fn parse(data: &[u8], base: u64) -> Result<Option<Self>> {
        let mut r = ByteReader::new(data, base);
        r.take(4)?;
        while r.remaining() >= 4 {
            let tag = r.u16()?;
            let size = r.u16()? as usize;
            let attr = r.take(size)?;
            if tag == NTFS_TIME_TAG && size >= 24 {
                let mut t = ByteReader::new(attr, base);
                return Ok(Some(Self {
                    modified: Timestamp::from_filetime(t.u64()?),
                    accessed: Timestamp::from_filetime(t.u64()?),
                    created: Timestamp::from_filetime(t.u64()?),
                }));
            }
        }
        Ok(None)
    }
}

/// Unix extended timestamp (32-bit seconds since the Unix epoch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnixTimes {
    /// Last modification time.
    pub modified: Option<i32>,
    /// Last access time.
    pub accessed: Option<i32>,
    /// Creation time.
    pub created: Option<i32>,
}

impl UnixTimes {
    fn flags(&self) -> u8 {
        u8::from(self.modified.is_some())
            | (u8::from(self.accessed.is_some()) << 1)
            | (u8::from(self.created.is_some()) << 2)
    }

    /// The central directory copy carries the flags of the local copy but
    /// only the modification time.
    fn write(&self, out: &mut Vec<u8>, central: bool) {
        let values: Vec<i32> = if central {
            self.modified.into_iter().collect()
        } else {
            [self.modified, self.accessed, self.created]
                .into_iter()
                .flatten()
                .collect()
        };
        out.put_u16(UNIX_TIME_EXTRA_ID);
        out.put_u16(1 + 4 * values.len() as u16);
        out.push(self.flags());
        for v in values {
            out.put_u32(v as u32);
        }
    }

    fn parse(data: &[u8], base: u64) -> Result<Self> {
        let mut r = ByteReader::new(data, base);
        let flags = r.u8()?;
        let mut times = UnixTimes::default();
        if flags & 1 != 0 && r.remaining() >= 4 {
            times.modified = Some(r.i32()?);
        }
        if flags & 2 != 0 && r.remaining() >= 4 {
            times.accessed = Some(r.i32()?);
        }
        if flags & 4 != 0 && r.remaining() >= 4 {
            times.created = Some(r.i32()?);
        }
        Ok(times)
    }
}

/// WinZip AES encryption descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    /// AE-1 or AE-2.
    pub version: AesVendorVersion,
    /// Key strength.
    pub strength: AesStrength,
    /// The real compression method of the encrypted payload.
    pub method: u16,
}

impl AesExtra {
    fn write(&self, out: &mut Vec<u8>) {
        out.put_u16(AES_EXTRA_ID);
        out.put_u16(7);
        out.put_u16(self.version as u16);
        out.extend_from_slice(b"AE");
        out.push(self.strength as u8);
        out.put_u16(self.method);
    }

    fn parse(data: &[u8], base: u64) -> Result<Self> {
        let mut r = ByteReader::new(data, base);
        let version = r.u16()?;
        let vendor = r.take(2)?;
        let strength = r.u8()?;
        let method = r.u16()?;
        if vendor != b"AE" {
            return Err(Error::corrupt_header(base, "AES extra field has bad vendor id"));
        }
        let version = AesVendorVersion::from_u16(version).ok_or_else(|| {
            Error::corrupt_header(base, format!("unknown AES vendor version {version}"))
        })?;
        let strength = AesStrength::from_u8(strength).ok_or_else(|| {
            Error::corrupt_header(base, format!("unknown AES strength {strength}"))
        })?;
        Ok(Self {
            version,
            strength,
            method,
        })
    }
}

/// The decoded set of extra fields attached to a header.
///
/// The Zip64 field is kept raw because its layout depends on which narrow
/// fields of the enclosing header hold the sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFields {
    /// Raw Zip64 field data, decoded by the enclosing header.
    pub zip64: Option<Vec<u8>>,
    /// NTFS timestamps.
    pub ntfs: Option<NtfsTimes>,
    /// Unix extended timestamp.
    pub unix: Option<UnixTimes>,
    /// WinZip AES descriptor.
    pub aes: Option<AesExtra>,
    /// Unrecognized fields, preserved verbatim as `(id, data)`.
    pub unknown: Vec<(u16, Vec<u8>)>,
}

impl ExtraFields {
    /// Parses a raw extra field block that starts at absolute offset `base`.
    ///
    /// Malformed timestamp fields are dropped with a warning; a malformed
    /// Zip64 or AES field is an error because decoding depends on it.
    pub fn parse(data: &[u8], base: u64) -> Result<Self> {
        let mut fields = ExtraFields::default();
        let mut r = ByteReader::new(data, base);
        while r.remaining() >= 4 {
            let field_offset = r.offset();
            let id = r.u16()?;
            let size = r.u16()? as usize;
            if size > r.remaining() {
                log::warn!(
                    "extra field {id:#06x} at {field_offset:#x} declares {size} bytes, only {} remain",
                    r.remaining()
                );
                break;
            }
            let body = r.take(size)?;
            let body_offset = field_offset + 4;
            match id {
                ZIP64_EXTRA_ID => fields.zip64 = Some(body.to_vec()),
                AES_EXTRA_ID => fields.aes = Some(AesExtra::parse(body, body_offset)?),
                NTFS_EXTRA_ID => match NtfsTimes::parse(body, body_offset) {
                    Ok(times) => fields.ntfs = times,
                    Err(e) => log::warn!("ignoring malformed NTFS extra field: {e}"),
                },
                UNIX_TIME_EXTRA_ID => match UnixTimes::parse(body, body_offset) {
                    Ok(times) => fields.unix = Some(times),
                    Err(e) => log::warn!("ignoring malformed extended timestamp field: {e}"),
                },
                PADDING_EXTRA_ID => {}
                _ => fields.unknown.push((id, body.to_vec())),
            }
        }
        Ok(fields)
    }

    /// Encodes every field except Zip64, which the enclosing header writes
    /// itself. Unix timestamps are shortened for the central directory.
    pub fn write(&self, out: &mut Vec<u8>, central: bool) {
        if let Some(ntfs) = &self.ntfs {
            ntfs.write(out);
        }
        if let Some(unix) = &self.unix {
            unix.write(out, central);
        }
        if let Some(aes) = &self.aes {
            aes.write(out);
        }
        for (id, data) in &self.unknown {
            out.put_u16(*id);
            out.put_u16(data.len() as u16);
            out.extend_from_slice(data);
        }
    }

    /// Returns the encoded length of [`write`](Self::write).
    pub fn encoded_len(&self, central: bool) -> usize {
        let mut buf = Vec::new();
        self.write(&mut buf, central);
        buf.len()
    }
}

/// Appends the padding field reserved for an in-place Zip64 rewrite.
pub fn write_padding(out: &mut Vec<u8>) {
    out.put_u16(PADDING_EXTRA_ID);
    out.put_u16((PADDING_EXTRA_LEN - 4) as u16);
    out.extend_from_slice(&[0u8; PADDING_EXTRA_LEN - 4]);
}
