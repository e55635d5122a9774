//! Data descriptor.
//!
//! Written after an entry's payload when general-purpose bit 3 is set,
//! because the CRC and sizes were not known when the local header went out.
//! The signature is optional in the format; this crate always writes it and
//! accepts its absence when reading. Sizes are 8 bytes wide when the entry
//! uses Zip64.

use std::io::{Read, Write};

use super::DATA_DESCRIPTOR_SIGNATURE;
use super::reader::{PutLe, read_u32_le, read_u64_le, truncated};
use crate::Result;

/// A data descriptor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size, including encryption overhead.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Encoded length with signature.
    pub const fn encoded_len(zip64: bool) -> usize {
        if zip64 { 24 } else { 16 }
    }

    /// Encodes the descriptor, signature included.
    pub fn encode(&self, zip64: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(zip64));
        out.put_u32(DATA_DESCRIPTOR_SIGNATURE);
        out.put_u32(self.crc32);
        if zip64 {
            out.put_u64(self.compressed_size);
            out.put_u64(self.uncompressed_size);
        } else {
            out.put_u32(self.compressed_size as u32);
            out.put_u32(self.uncompressed_size as u32);
        }
        out
    }

    /// Writes the descriptor, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W, zip64: bool) -> Result<usize> {
        let bytes = self.encode(zip64);
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Reads a descriptor whose first byte is at `offset`, with or without
    /// the leading signature.
    pub fn read_from<R: Read>(r: &mut R, zip64: bool, offset: u64) -> Result<Self> {
        let map = |e| truncated(e, offset, "data descriptor");
        let first = read_u32_le(r).map_err(map)?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
            read_u32_le(r).map_err(map)?
        } else {
            first
        };
        let (compressed_size, uncompressed_size) = if zip64 {
            (read_u64_le(r).map_err(map)?, read_u64_le(r).map_err(map)?)
        } else {
            (
                u64::from(read_u32_le(r).map_err(map)?),
                u64::from(read_u32_le(r).map_err(map)?),
            )
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_narrow_layout() {
        let dd = DataDescriptor {
            crc32: 0x11223344,
            compressed_size: 5,
            uncompressed_size: 10,
        };
        let bytes = dd.encode(false);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x07, 0x08]);
        let parsed = DataDescriptor::read_from(&mut Cursor::new(bytes), false, 0).unwrap();
        assert_eq!(parsed, dd);
    }

    #[test]
    fn test_zip64_layout() {
        let dd = DataDescriptor {
            crc32: 1,
            compressed_size: 1 << 33,
            uncompressed_size: 1 << 34,
        };
        let bytes = dd.encode(true);
        assert_eq!(bytes.len(), 24);
        let parsed = DataDescriptor::read_from(&mut Cursor::new(bytes), true, 0).unwrap();
        assert_eq!(parsed, dd);
    }

    #[test]
    fn test_without_signature() {
        let mut bytes = Vec::new();
        bytes.put_u32(0xCAFEBABE);
        bytes.put_u32(3);
        bytes.put_u32(4);
        let parsed = DataDescriptor::read_from(&mut Cursor::new(bytes), false, 0).unwrap();
        assert_eq!(parsed.crc32, 0xCAFEBABE);
        assert_eq!(parsed.compressed_size, 3);
        assert_eq!(parsed.uncompressed_size, 4);
    }

    #[test]
    fn test_truncated() {
        let bytes = [0x50, 0x4b, 0x07, 0x08, 1, 2];
        assert!(DataDescriptor::read_from(&mut Cursor::new(bytes), false, 0).is_err());
    }
}
