//! End of central directory records.
//!
//! The archive ends with, in order:
//!
//! 1. the Zip64 end of central directory record (optional),
//! 2. the Zip64 end of central directory locator (present iff 1 is),
//! 3. the end of central directory record, followed by the archive comment.
//!
//! [`CentralDirectoryEnd`] combines the three into the archive-level totals
//! and decides which of them to emit under a [`Zip64Policy`].

use std::io::{Read, Seek, SeekFrom, Write};

use super::reader::{ByteReader, PutLe, read_bytes, truncated};
use super::{
    CentralDirectoryHeader, EOCD_SIGNATURE, ZIP64_EOCD_LOCATOR_SIGNATURE, ZIP64_EOCD_SIGNATURE,
    ZIP64_SENTINEL_U16, ZIP64_SENTINEL_U32, Zip64Policy, overflows_u16, overflows_u32, version,
};
use crate::{Error, Result};

/// The classic end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Entries on this disk.
    pub entries_on_disk: u16,
    /// Total entries.
    pub entries_total: u16,
    /// Central directory size.
    pub cd_size: u32,
    /// Central directory offset.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Length of the fixed part of the record.
    pub const FIXED_LEN: usize = 22;

    /// Appends the record to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let comment_len = u16::try_from(self.comment.len())
            .map_err(|_| Error::InvalidArgument("archive comment longer than 65535 bytes".into()))?;
        out.put_u32(EOCD_SIGNATURE);
        out.put_u16(self.disk_number);
        out.put_u16(self.cd_disk);
        out.put_u16(self.entries_on_disk);
        out.put_u16(self.entries_total);
        out.put_u32(self.cd_size);
        out.put_u32(self.cd_offset);
        out.put_u16(comment_len);
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    /// Parses the record from a buffer that starts at its signature.
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let offset = r.offset();
        if r.u32()? != EOCD_SIGNATURE {
            return Err(Error::corrupt_header(offset, "bad end of central directory signature"));
        }
        let disk_number = r.u16()?;
        let cd_disk = r.u16()?;
        let entries_on_disk = r.u16()?;
        let entries_total = r.u16()?;
        let cd_size = r.u32()?;
        let cd_offset = r.u32()?;
        let comment_len = r.u16()? as usize;
        let comment = r.take(comment_len.min(r.remaining()))?.to_vec();
        Ok(Self {
            disk_number,
            cd_disk,
            entries_on_disk,
            entries_total,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// Finds the record by scanning backwards from the end of the source.
    ///
    /// Returns the record and its absolute offset. A signature whose
    /// comment length matches the remaining bytes exactly is preferred; a
    /// signature followed by trailing garbage is accepted with a warning.
    pub fn locate<R: Read + Seek>(r: &mut R) -> Result<(Self, u64)> {
        let file_len = r.seek(SeekFrom::End(0))?;
        if file_len < Self::FIXED_LEN as u64 {
            return Err(Error::InvalidFormat(format!(
                "file too small to be a ZIP archive ({file_len} bytes)"
            )));
        }
        let tail_len = file_len.min((Self::FIXED_LEN + u16::MAX as usize) as u64);
        let tail_start = file_len - tail_len;
        r.seek(SeekFrom::Start(tail_start))?;
        let tail = read_bytes(r, tail_len as usize)?;

        let signature = EOCD_SIGNATURE.to_le_bytes();
        let mut fallback = None;
        for pos in (0..=tail.len() - Self::FIXED_LEN).rev() {
            if tail[pos..pos + 4] != signature {
                continue;
            }
            let comment_len = u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]) as usize;
            let end = pos + Self::FIXED_LEN + comment_len;
            if end == tail.len() {
                let record = Self::parse(&mut ByteReader::new(&tail[pos..], tail_start + pos as u64))?;
                return Ok((record, tail_start + pos as u64));
            }
            if end < tail.len() && fallback.is_none() {
                fallback = Some(pos);
            }
        }
        match fallback {
            Some(pos) => {
                log::warn!(
                    "end of central directory at {:#x} is followed by trailing data",
                    tail_start + pos as u64
                );
                let record = Self::parse(&mut ByteReader::new(&tail[pos..], tail_start + pos as u64))?;
                Ok((record, tail_start + pos as u64))
            }
            None => Err(Error::InvalidFormat(
                "end of central directory record not found".into(),
            )),
        }
    }
}

/// The Zip64 end of central directory locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64EndLocator {
    /// Disk holding the Zip64 record.
    pub record_disk: u32,
    /// Offset of the Zip64 record.
    pub record_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64EndLocator {
    /// Length of the record.
    pub const LEN: usize = 20;

    /// Appends the locator to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(ZIP64_EOCD_LOCATOR_SIGNATURE);
        out.put_u32(self.record_disk);
        out.put_u64(self.record_offset);
        out.put_u32(self.total_disks);
    }

    /// Parses the locator, returning `None` if the signature is absent.
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Option<Self>> {
        if r.u32()? != ZIP64_EOCD_LOCATOR_SIGNATURE {
            return Ok(None);
        }
        Ok(Some(Self {
            record_disk: r.u32()?,
            record_offset: r.u64()?,
            total_disks: r.u32()?,
        }))
    }
}

/// The Zip64 end of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64EndRecord {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub cd_disk: u32,
    /// Entries on this disk.
    pub entries_on_disk: u64,
    /// Total entries.
    pub entries_total: u64,
    /// Central directory size.
    pub cd_size: u64,
    /// Central directory offset.
    pub cd_offset: u64,
}

impl Zip64EndRecord {
    /// Length of the record without extensible data.
    pub const FIXED_LEN: usize = 56;

    /// Appends the record to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(ZIP64_EOCD_SIGNATURE);
        // Size of the remaining record, excluding signature and this field
        out.put_u64((Self::FIXED_LEN - 12) as u64);
        out.put_u16(self.version_made_by);
        out.put_u16(self.version_needed);
        out.put_u32(self.disk_number);
        out.put_u32(self.cd_disk);
        out.put_u64(self.entries_on_disk);
        out.put_u64(self.entries_total);
        out.put_u64(self.cd_size);
        out.put_u64(self.cd_offset);
    }

    /// Parses the record, ignoring any extensible data.
    pub fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let offset = r.offset();
        if r.u32()? != ZIP64_EOCD_SIGNATURE {
            return Err(Error::corrupt_header(offset, "bad Zip64 end of central directory signature"));
        }
        let _record_size = r.u64()?;
        Ok(Self {
            version_made_by: r.u16()?,
            version_needed: r.u16()?,
            disk_number: r.u32()?,
            cd_disk: r.u32()?,
            entries_on_disk: r.u64()?,
            entries_total: r.u64()?,
            cd_size: r.u64()?,
            cd_offset: r.u64()?,
        })
    }
}

/// Archive-level totals resolved from the trailing records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryEnd {
    /// Number of entries.
    pub entries: u64,
    /// Size of the central directory in bytes.
    pub cd_size: u64,
    /// Offset of the first central directory header.
    pub cd_offset: u64,
    /// Archive comment.
    pub comment: Vec<u8>,
    /// Whether Zip64 end records were present or written.
    pub zip64: bool,
}

impl CentralDirectoryEnd {
    /// Returns `true` if the totals require Zip64 end records under
    /// [`Zip64Policy::AsNecessary`].
    pub fn requires_zip64(entries: u64, cd_offset: u64, cd_size: u64) -> bool {
        overflows_u16(entries) || overflows_u32(cd_offset) || overflows_u32(cd_size)
    }

    /// Writes the trailing records for a central directory that was just
    /// written at `cd_offset`. Returns `true` if Zip64 records were emitted.
    pub fn write_to<W: Write>(
        w: &mut W,
        entries: u64,
        cd_offset: u64,
        cd_size: u64,
        comment: &[u8],
        policy: Zip64Policy,
    ) -> Result<bool> {
        let wide_entries = policy.widen("entry count", entries, overflows_u16(entries))?;
        let wide_size = policy.widen("central directory size", cd_size, overflows_u32(cd_size))?;
        let wide_offset =
            policy.widen("central directory offset", cd_offset, overflows_u32(cd_offset))?;
        let zip64 = wide_entries || wide_size || wide_offset;

        let mut out = Vec::new();
        if zip64 {
            let record_offset = cd_offset + cd_size;
            Zip64EndRecord {
                version_made_by: version::MADE_BY,
                version_needed: version::ZIP64,
                disk_number: 0,
                cd_disk: 0,
                entries_on_disk: entries,
                entries_total: entries,
                cd_size,
                cd_offset,
            }
            .write(&mut out);
            Zip64EndLocator {
                record_disk: 0,
                record_offset,
                total_disks: 1,
            }
            .write(&mut out);
        }
        let narrow_entries = if wide_entries { ZIP64_SENTINEL_U16 } else { entries as u16 };
        EndOfCentralDirectory {
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: narrow_entries,
            entries_total: narrow_entries,
            cd_size: if wide_size { ZIP64_SENTINEL_U32 } else { cd_size as u32 },
            cd_offset: if wide_offset { ZIP64_SENTINEL_U32 } else { cd_offset as u32 },
            comment: comment.to_vec(),
        }
        .write(&mut out)?;
        w.write_all(&out)?;
        Ok(zip64)
    }

    /// Reads and validates the trailing records of an archive.
    ///
    /// The entry count and directory extent are checked against the source
    /// size so the caller can safely allocate the central directory.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let (eocd, eocd_offset) = EndOfCentralDirectory::locate(r)?;

        let mut zip64_record = None;
        let mut directory_end = eocd_offset;
        if eocd_offset >= Zip64EndLocator::LEN as u64 {
            let locator_offset = eocd_offset - Zip64EndLocator::LEN as u64;
            r.seek(SeekFrom::Start(locator_offset))?;
            let raw = read_bytes(r, Zip64EndLocator::LEN)
                .map_err(|e| truncated(e, locator_offset, "Zip64 locator"))?;
            if let Some(locator) = Zip64EndLocator::parse(&mut ByteReader::new(&raw, locator_offset))? {
                if locator.record_disk != 0 || locator.total_disks > 1 {
                    return Err(Error::UnsupportedFeature {
                        feature: "split archives",
                    });
                }
                let record_end = locator.record_offset.checked_add(Zip64EndRecord::FIXED_LEN as u64);
                if record_end.is_none_or(|end| end > locator_offset) {
                    return Err(Error::corrupt_header(
                        locator_offset,
                        format!("Zip64 record offset {:#x} out of range", locator.record_offset),
                    ));
                }
                r.seek(SeekFrom::Start(locator.record_offset))?;
                let raw = read_bytes(r, Zip64EndRecord::FIXED_LEN)
                    .map_err(|e| truncated(e, locator.record_offset, "Zip64 record"))?;
                let record = Zip64EndRecord::parse(&mut ByteReader::new(&raw, locator.record_offset))?;
                directory_end = locator.record_offset;
                zip64_record = Some(record);
            }
        }

        let end = match zip64_record {
            Some(record) => {
                if record.disk_number != 0 || record.cd_disk != 0 {
                    return Err(Error::UnsupportedFeature {
                        feature: "split archives",
                    });
                }
                Self {
                    entries: record.entries_total,
                    cd_size: record.cd_size,
                    cd_offset: record.cd_offset,
                    comment: eocd.comment,
                    zip64: true,
                }
            }
            None => {
                if eocd.disk_number != 0 || eocd.cd_disk != 0 || eocd.entries_on_disk != eocd.entries_total {
                    return Err(Error::UnsupportedFeature {
                        feature: "split archives",
                    });
                }
                Self {
                    entries: u64::from(eocd.entries_total),
                    cd_size: u64::from(eocd.cd_size),
                    cd_offset: u64::from(eocd.cd_offset),
                    comment: eocd.comment,
                    zip64: false,
                }
            }
        };

        let cd_end = end.cd_offset.checked_add(end.cd_size);
        if cd_end.is_none_or(|cd_end| cd_end > directory_end) {
            return Err(Error::corrupt_header(
                eocd_offset,
                format!(
                    "central directory ({} bytes at {:#x}) extends past its end record",
                    end.cd_size, end.cd_offset
                ),
            ));
        }
        let min_size = end.entries.saturating_mul(CentralDirectoryHeader::FIXED_LEN as u64);
        if min_size > end.cd_size {
            return Err(Error::corrupt_header(
                eocd_offset,
                format!(
                    "{} entries cannot fit in a {} byte central directory",
                    end.entries, end.cd_size
                ),
            ));
        }
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn archive_tail(entries: u64, policy: Zip64Policy, comment: &[u8]) -> Vec<u8> {
        // A fake central directory of the right size filled with zeros
        let cd_size = entries * 46;
        let mut buf = vec![0u8; cd_size as usize];
        CentralDirectoryEnd::write_to(&mut buf, entries, 0, cd_size, comment, policy).unwrap();
        buf
    }

    #[test]
    fn test_empty_archive() {
        let buf = archive_tail(0, Zip64Policy::AsNecessary, b"");
        assert_eq!(buf.len(), 22);
        let end = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(end.entries, 0);
        assert!(!end.zip64);
    }

    #[test]
    fn test_comment_preserved() {
        let buf = archive_tail(1, Zip64Policy::AsNecessary, b"hello");
        let end = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(end.comment, b"hello");
        assert_eq!(end.cd_size, 46);
    }

    #[test]
    fn test_comment_containing_signature() {
        let mut comment = EOCD_SIGNATURE.to_le_bytes().to_vec();
        comment.extend_from_slice(&[0u8; 30]);
        let buf = archive_tail(0, Zip64Policy::AsNecessary, &comment);
        let end = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(end.comment, comment);
    }

    #[test]
    fn test_always_emits_zip64_records() {
        let buf = archive_tail(2, Zip64Policy::Always, b"");
        assert_eq!(buf.len(), 92 + 56 + 20 + 22);
        let end = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap();
        assert!(end.zip64);
        assert_eq!(end.entries, 2);
    }

    #[test]
    fn test_entry_count_threshold() {
        assert!(!CentralDirectoryEnd::requires_zip64(65534, 0, 0));
        assert!(CentralDirectoryEnd::requires_zip64(65535, 0, 0));
        assert!(CentralDirectoryEnd::requires_zip64(1, 0xFFFF_FFFF, 0));
    }

    #[test]
    fn test_never_refuses_large_count() {
        let mut out = Vec::new();
        let err = CentralDirectoryEnd::write_to(&mut out, 65535, 0, 0, b"", Zip64Policy::Never)
            .unwrap_err();
        assert!(matches!(err, Error::Zip64Required { field: "entry count", .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_not_a_zip() {
        let err = CentralDirectoryEnd::read_from(&mut Cursor::new(vec![0u8; 100])).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        let err = CentralDirectoryEnd::read_from(&mut Cursor::new(vec![0u8; 5])).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_directory_past_end_is_corrupt() {
        let mut buf = Vec::new();
        EndOfCentralDirectory {
            entries_on_disk: 1,
            entries_total: 1,
            cd_size: 46,
            cd_offset: 1000,
            ..Default::default()
        }
        .write(&mut buf)
        .unwrap();
        let err = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn test_huge_entry_count_rejected_before_allocation() {
        let mut buf = vec![0u8; 46];
        EndOfCentralDirectory {
            entries_on_disk: 60000,
            entries_total: 60000,
            cd_size: 46,
            cd_offset: 0,
            ..Default::default()
        }
        .write(&mut buf)
        .unwrap();
        let err = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn test_trailing_garbage_tolerated() {
        let mut buf = archive_tail(0, Zip64Policy::AsNecessary, b"");
        buf.extend_from_slice(b"junk");
        let end = CentralDirectoryEnd::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(end.entries, 0);
    }
}
