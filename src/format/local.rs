//! Local file header.
//!
//! ```text
//! signature                 4  0x04034b50
//! version needed            2
//! flags                     2
//! compression method        2
//! last mod time             2
//! last mod date             2
//! crc-32                    4
//! compressed size           4
//! uncompressed size         4
//! name length               2
//! extra length              2
//! name, extra
//! ```

use std::io::{Read, Write};

use super::extra::{self, ExtraFields, Zip64Extra};
use super::reader::{ByteReader, PutLe, read_bytes, truncated};
use super::{LOCAL_FILE_HEADER_SIGNATURE, ZIP64_SENTINEL_U32, overflows_u32};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// How the local header represents 64-bit sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZip64 {
    /// Narrow size fields only.
    #[default]
    None,
    /// Narrow fields plus a reserved padding field that can be rewritten
    /// into a Zip64 field of the same length.
    Padding,
    /// Sentinel size fields with a Zip64 field holding both sizes.
    Extra,
}

/// A local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General-purpose flags.
    pub flags: u16,
    /// Compression method as stored (99 for AES).
    pub method: u16,
    /// MS-DOS modification time.
    pub modified: DosDateTime,
    /// CRC-32, zero when deferred to a data descriptor.
    pub crc32: u32,
    /// Compressed size, zero when deferred.
    pub compressed_size: u64,
    /// Uncompressed size, zero when deferred.
    pub uncompressed_size: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields other than Zip64 and padding.
    pub extra: ExtraFields,
    /// Zip64 representation.
    pub zip64: LocalZip64,
}

impl LocalFileHeader {
    /// Length of the fixed part of the header.
    pub const FIXED_LEN: usize = 30;

    /// Encodes the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Zip64Required`] if a size overflows and the header
    /// has no Zip64 field, and [`Error::InvalidArgument`] if the extra data
    /// does not fit its 16-bit length field.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut extra_data = Vec::new();
        let (narrow_compressed, narrow_uncompressed) = match self.zip64 {
            LocalZip64::Extra => {
                Zip64Extra {
                    uncompressed_size: Some(self.uncompressed_size),
                    compressed_size: Some(self.compressed_size),
                    ..Default::default()
                }
                .write(&mut extra_data);
                (ZIP64_SENTINEL_U32, ZIP64_SENTINEL_U32)
            }
            LocalZip64::None | LocalZip64::Padding => {
                if overflows_u32(self.compressed_size) {
                    return Err(Error::Zip64Required {
                        field: "compressed size",
                        value: self.compressed_size,
                    });
                }
                if overflows_u32(self.uncompressed_size) {
                    return Err(Error::Zip64Required {
                        field: "uncompressed size",
                        value: self.uncompressed_size,
                    });
                }
                if self.zip64 == LocalZip64::Padding {
                    extra::write_padding(&mut extra_data);
                }
                (self.compressed_size as u32, self.uncompressed_size as u32)
            }
        };
        self.extra.write(&mut extra_data, false);
        let extra_len = u16::try_from(extra_data.len()).map_err(|_| {
            Error::InvalidArgument(format!("extra fields too long: {} bytes", extra_data.len()))
        })?;
        let name_len = u16::try_from(self.name.len())
            .map_err(|_| Error::InvalidEntryName("name too long".into()))?;

        let mut out = Vec::with_capacity(Self::FIXED_LEN + self.name.len() + extra_data.len());
        out.put_u32(LOCAL_FILE_HEADER_SIGNATURE);
        out.put_u16(self.version_needed);
        out.put_u16(self.flags);
        out.put_u16(self.method);
        out.put_u16(self.modified.time);
        out.put_u16(self.modified.date);
        out.put_u32(self.crc32);
        out.put_u32(narrow_compressed);
        out.put_u32(narrow_uncompressed);
        out.put_u16(name_len);
        out.put_u16(extra_len);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&extra_data);
        Ok(out)
    }

    /// Encodes and writes the header, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.encode()?;
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Reads a header whose signature starts at absolute offset `offset`.
    pub fn read_from<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let mut fixed = [0u8; Self::FIXED_LEN];
        r.read_exact(&mut fixed)
            .map_err(|e| truncated(e, offset, "local file header"))?;
        Self::parse_after_fixed(&fixed, r, offset)
    }

    /// Completes parsing once the 30 fixed bytes are in hand.
    pub(crate) fn parse_after_fixed<R: Read>(
        fixed: &[u8; Self::FIXED_LEN],
        r: &mut R,
        offset: u64,
    ) -> Result<Self> {
        let mut f = ByteReader::new(fixed, offset);
        let signature = f.u32()?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(Error::corrupt_header(
                offset,
                format!("expected local file header signature, found {signature:#010x}"),
            ));
        }
        let version_needed = f.u16()?;
        let flags = f.u16()?;
        let method = f.u16()?;
        let time = f.u16()?;
        let date = f.u16()?;
        let crc32 = f.u32()?;
        let narrow_compressed = f.u32()?;
        let narrow_uncompressed = f.u32()?;
        let name_len = f.u16()? as usize;
        let extra_len = f.u16()? as usize;

        let name = read_bytes(r, name_len).map_err(|e| truncated(e, offset, "entry name"))?;
        let extra_bytes = read_bytes(r, extra_len).map_err(|e| truncated(e, offset, "extra field"))?;
        let extra_base = offset + (Self::FIXED_LEN + name_len) as u64;
        let mut extra = ExtraFields::parse(&extra_bytes, extra_base)?;

        let mut compressed_size = u64::from(narrow_compressed);
        let mut uncompressed_size = u64::from(narrow_uncompressed);
        let mut zip64 = LocalZip64::None;
        if let Some(data) = extra.zip64.take() {
            zip64 = LocalZip64::Extra;
            let want_u = narrow_uncompressed == ZIP64_SENTINEL_U32;
            let want_c = narrow_compressed == ZIP64_SENTINEL_U32;
            // The local copy must carry both sizes; tolerate writers that
            // only include the flagged ones.
            let both = data.len() >= 16;
            let parsed = Zip64Extra::parse(&data, extra_base, both || want_u, both || want_c, false, false)?;
            if want_u {
                uncompressed_size = parsed.uncompressed_size.unwrap_or(uncompressed_size);
            }
            if want_c {
                compressed_size = parsed.compressed_size.unwrap_or(compressed_size);
            }
        }

        Ok(Self {
            version_needed,
            flags,
            method,
            modified: DosDateTime::new(date, time),
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
            zip64,
        })
    }

    /// Returns the encoded length of the header.
    pub fn encoded_len(&self) -> usize {
        let zip64_len = match self.zip64 {
            LocalZip64::None => 0,
            LocalZip64::Padding | LocalZip64::Extra => extra::PADDING_EXTRA_LEN,
        };
        Self::FIXED_LEN + self.name.len() + zip64_len + self.extra.encoded_len(false)
    }
}
