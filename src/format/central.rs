//! Central directory file header.
//!
//! ```text
//! signature                 4  0x02014b50
//! version made by           2
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
//! comment length            2
//! disk number start         2
//! internal attributes       2
//! external attributes       4
//! local header offset       4
//! name, extra, comment
//! ```

use super::extra::{ExtraFields, Zip64Extra};
use super::reader::{ByteReader, PutLe};
use super::{
    CENTRAL_DIRECTORY_SIGNATURE, ZIP64_SENTINEL_U16, ZIP64_SENTINEL_U32, Zip64Policy,
    overflows_u32, version,
};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// A central directory file header with sizes and offset resolved to 64 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General-purpose flags.
    pub flags: u16,
    /// Compression method as stored (99 for AES).
    pub method: u16,
    /// MS-DOS modification time.
    pub modified: DosDateTime,
    /// CRC-32.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Disk number where the entry starts.
    pub disk_start: u32,
    /// Internal attributes.
    pub internal_attributes: u16,
    /// External (host) attributes.
    pub external_attributes: u32,
    /// Offset of the local header.
    pub local_header_offset: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields other than Zip64.
    pub extra: ExtraFields,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Length of the fixed part of the header.
    pub const FIXED_LEN: usize = 46;

    /// Returns `true` if encoding under `policy` needs a Zip64 field.
    pub fn needs_zip64(&self, policy: Zip64Policy) -> bool {
        match policy {
            Zip64Policy::Always => true,
            Zip64Policy::Never => false,
            Zip64Policy::AsNecessary => {
                overflows_u32(self.uncompressed_size)
                    || overflows_u32(self.compressed_size)
                    || overflows_u32(self.local_header_offset)
            }
        }
    }

    /// Encodes the header and appends it to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Zip64Required`] under [`Zip64Policy::Never`] if a
    /// value overflows.
    pub fn write(&self, out: &mut Vec<u8>, policy: Zip64Policy) -> Result<()> {
        let wide_u = policy.widen(
            "uncompressed size",
            self.uncompressed_size,
            overflows_u32(self.uncompressed_size),
        )?;
        let wide_c = policy.widen(
            "compressed size",
            self.compressed_size,
            overflows_u32(self.compressed_size),
        )?;
        let wide_o = policy.widen(
            "local header offset",
            self.local_header_offset,
            overflows_u32(self.local_header_offset),
        )?;

        let zip64 = Zip64Extra {
            uncompressed_size: wide_u.then_some(self.uncompressed_size),
            compressed_size: wide_c.then_some(self.compressed_size),
            header_offset: wide_o.then_some(self.local_header_offset),
            disk_start: None,
        };
        let mut extra_data = Vec::new();
        if !zip64.is_empty() {
            zip64.write(&mut extra_data);
        }
        self.extra.write(&mut extra_data, true);

        let name_len = u16::try_from(self.name.len())
            .map_err(|_| Error::InvalidEntryName("name too long".into()))?;
        let extra_len = u16::try_from(extra_data.len()).map_err(|_| {
            Error::InvalidArgument(format!("extra fields too long: {} bytes", extra_data.len()))
        })?;
        let comment_len = u16::try_from(self.comment.len())
            .map_err(|_| Error::InvalidArgument("entry comment longer than 65535 bytes".into()))?;
        let version_needed = if zip64.is_empty() {
            self.version_needed
        } else {
            self.version_needed.max(version::ZIP64)
        };
        let narrow = |wide: bool, v: u64| if wide { ZIP64_SENTINEL_U32 } else { v as u32 };

        out.put_u32(CENTRAL_DIRECTORY_SIGNATURE);
        out.put_u16(self.version_made_by);
        out.put_u16(version_needed);
        out.put_u16(self.flags);
        out.put_u16(self.method);
        out.put_u16(self.modified.time);
        out.put_u16(self.modified.date);
        out.put_u32(self.crc32);
        out.put_u32(narrow(wide_c, self.compressed_size));
        out.put_u32(narrow(wide_u, self.uncompressed_size));
        out.put_u16(name_len);
        out.put_u16(extra_len);
        out.put_u16(comment_len);
        out.put_u16(self.disk_start as u16);
        out.put_u16(self.internal_attributes);
        out.put_u32(self.external_attributes);
        out.put_u32(narrow(wide_o, self.local_header_offset));
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&extra_data);
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    /// Parses one header from an in-memory central directory.
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let offset = r.offset();
        let signature = r.u32()?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(Error::corrupt_header(
                offset,
                format!("expected central directory signature, found {signature:#010x}"),
            ));
        }
        let version_made_by = r.u16()?;
        let version_needed = r.u16()?;
        let flags = r.u16()?;
        let method = r.u16()?;
        let time = r.u16()?;
        let date = r.u16()?;
        let crc32 = r.u32()?;
        let narrow_compressed = r.u32()?;
        let narrow_uncompressed = r.u32()?;
        let name_len = r.u16()? as usize;
        let extra_len = r.u16()? as usize;
        let comment_len = r.u16()? as usize;
        let narrow_disk = r.u16()?;
        let internal_attributes = r.u16()?;
        let external_attributes = r.u32()?;
        let narrow_offset = r.u32()?;
        let name = r.take(name_len)?.to_vec();
        let extra_base = r.offset();
        let mut extra = ExtraFields::parse(r.take(extra_len)?, extra_base)?;
        let comment = r.take(comment_len)?.to_vec();

        let mut header = Self {
            version_made_by,
            version_needed,
            flags,
            method,
            modified: DosDateTime::new(date, time),
            crc32,
            compressed_size: u64::from(narrow_compressed),
            uncompressed_size: u64::from(narrow_uncompressed),
            disk_start: u32::from(narrow_disk),
            internal_attributes,
            external_attributes,
            local_header_offset: u64::from(narrow_offset),
            name,
            extra: ExtraFields::default(),
            comment,
        };

        let want_u = narrow_uncompressed == ZIP64_SENTINEL_U32;
        let want_c = narrow_compressed == ZIP64_SENTINEL_U32;
        let want_o = narrow_offset == ZIP64_SENTINEL_U32;
        let want_d = narrow_disk == ZIP64_SENTINEL_U16;
        if let Some(data) = extra.zip64.take() {
            let zip64 = Zip64Extra::parse(&data, extra_base, want_u, want_c, want_o, want_d)?;
            if let Some(v) = zip64.uncompressed_size {
                header.uncompressed_size = v;
            }
            if let Some(v) = zip64.compressed_size {
                header.compressed_size = v;
            }
            if let Some(v) = zip64.header_offset {
                header.local_header_offset = v;
            }
            if let Some(v) = zip64.disk_start {
                header.disk_start = v;
            }
        } else if want_u || want_c || want_o {
            return Err(Error::corrupt_header(
                offset,
                "sentinel value without a Zip64 extra field",
            ));
        }
        header.extra = extra;
        Ok(header)
    }
}
