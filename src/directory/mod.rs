//! The ordered set of entries of one archive.
//!
//! [`ArchiveDirectory`] maps entry names to [`EntryRecord`]s in insertion
//! order. Records move through three stages:
//!
//! - `Pending`: registered, no bytes written yet. The payload type `P` is
//!   whatever the owner needs to produce the bytes later (the editor stores
//!   the content source there).
//! - `Streaming`: the local header is out and payload bytes are flowing.
//! - `Sealed`: sizes and CRC are final and the headers agree.
//!
//! Only sealed records are written to the central directory.

mod entry;

pub use entry::{ArchiveEntry, DOS_ARCHIVE_ATTRIBUTE, DOS_DIRECTORY_ATTRIBUTE};
pub(crate) use entry::decode_text;

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::format::reader::{ByteReader, read_bytes, truncated};
use crate::format::{CentralDirectoryEnd, CentralDirectoryHeader, Zip64Policy};
use crate::{Error, Result};

/// An entry whose payload is being written.
#[derive(Debug, Clone)]
pub struct StreamingEntry {
    /// Metadata known when the entry was opened. Sizes and CRC are zero.
    pub entry: ArchiveEntry,
    /// Uncompressed bytes accepted so far.
    pub bytes_in: u64,
    /// Compressed bytes (including encryption overhead) written so far.
    pub bytes_out: u64,
}

/// The lifecycle stage of an entry.
#[derive(Debug, Clone)]
pub enum EntryRecord<P> {
    /// Registered; content not yet written.
    Pending(P),
    /// Payload bytes are flowing.
    Streaming(StreamingEntry),
    /// Headers final.
    Sealed(ArchiveEntry),
}

impl<P> EntryRecord<P> {
    /// Returns the sealed entry, if any.
    pub fn as_sealed(&self) -> Option<&ArchiveEntry> {
        match self {
            EntryRecord::Sealed(entry) => Some(entry),
            _ => None,
        }
    }

    /// Returns true for `Pending` records.
    pub fn is_pending(&self) -> bool {
        matches!(self, EntryRecord::Pending(_))
    }

    fn stage(&self) -> &'static str {
        match self {
            EntryRecord::Pending(_) => "pending",
            EntryRecord::Streaming(_) => "streaming",
            EntryRecord::Sealed(_) => "sealed",
        }
    }
}

/// Totals of a written central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySummary {
    /// Number of entries written.
    pub entries: u64,
    /// Offset of the first central header.
    pub cd_offset: u64,
    /// Size of the central directory.
    pub cd_size: u64,
    /// Whether the Zip64 end records were written.
    pub zip64: bool,
}

/// An ordered name → record map.
#[derive(Debug, Clone)]
pub struct ArchiveDirectory<P> {
    records: Vec<(String, EntryRecord<P>)>,
    index: HashMap<String, usize>,
}

impl<P> Default for ArchiveDirectory<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ArchiveDirectory<P> {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the number of records in any stage.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the record for `name`.
    pub fn get(&self, name: &str) -> Option<&EntryRecord<P>> {
        self.index.get(name).map(|&i| &self.records[i].1)
    }

    /// Returns the sealed entry for `name`.
    pub fn sealed(&self, name: &str) -> Option<&ArchiveEntry> {
        self.get(name).and_then(EntryRecord::as_sealed)
    }

    /// Returns the position of `name` in insertion order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn push(&mut self, name: String, record: EntryRecord<P>) -> Result<usize> {
        if self.index.contains_key(&name) {
            return Err(Error::EntryExists { path: name });
        }
        let position = self.records.len();
        self.index.insert(name.clone(), position);
        self.records.push((name, record));
        Ok(position)
    }

    /// Registers an entry whose content will be produced later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryExists`] if the name is taken.
    pub fn insert_pending(&mut self, name: impl Into<String>, payload: P) -> Result<usize> {
        self.push(name.into(), EntryRecord::Pending(payload))
    }

    /// Registers an already sealed entry.
    pub fn insert_sealed(&mut self, entry: ArchiveEntry) -> Result<usize> {
        self.push(entry.name.clone(), EntryRecord::Sealed(entry))
    }

    /// Replaces the record for `name`, or appends it if absent.
    pub fn upsert(&mut self, name: &str, record: EntryRecord<P>) -> usize {
        match self.index.get(name) {
            Some(&i) => {
                self.records[i].1 = record;
                i
            }
            None => {
                let i = self.records.len();
                self.index.insert(name.to_string(), i);
                self.records.push((name.to_string(), record));
                i
            }
        }
    }

    /// Moves an entry into the streaming stage.
    ///
    /// A pending record of the same name is replaced; any other existing
    /// record is a duplicate.
    pub fn begin_streaming(&mut self, entry: ArchiveEntry) -> Result<usize> {
        let name = entry.name.clone();
        let record = EntryRecord::Streaming(StreamingEntry {
            entry,
            bytes_in: 0,
            bytes_out: 0,
        });
        match self.index.get(&name) {
            Some(&i) if self.records[i].1.is_pending() => {
                self.records[i].1 = record;
                Ok(i)
            }
            Some(_) => Err(Error::EntryExists { path: name }),
            None => self.push(name, record),
        }
    }

    /// Returns the streaming record at `position`.
    pub fn streaming_mut(&mut self, position: usize) -> Option<&mut StreamingEntry> {
        match self.records.get_mut(position) {
            Some((_, EntryRecord::Streaming(s))) => Some(s),
            _ => None,
        }
    }

    /// Seals the streaming record at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the record is not streaming.
    pub fn seal(&mut self, position: usize, entry: ArchiveEntry) -> Result<()> {
        match self.records.get_mut(position) {
            Some((name, record @ EntryRecord::Streaming(_))) => {
                log::debug!(
                    "sealed '{}': {} -> {} bytes, crc {:#010x}",
                    name,
                    entry.uncompressed_size,
                    entry.compressed_size,
                    entry.crc32
                );
                *record = EntryRecord::Sealed(entry);
                Ok(())
            }
            Some((name, record)) => Err(Error::invalid_state(format!(
                "cannot seal '{}': entry is {}",
                name,
                record.stage()
            ))),
            None => Err(Error::invalid_state(format!("no entry at position {position}"))),
        }
    }

    /// Removes the record for `name`.
    pub fn remove(&mut self, name: &str) -> Option<EntryRecord<P>> {
        let position = self.index.remove(name)?;
        let (_, record) = self.records.remove(position);
        for (i, (n, _)) in self.records.iter().enumerate().skip(position) {
            self.index.insert(n.clone(), i);
        }
        Some(record)
    }

    /// Renames an entry, keeping its position and payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if `from` does not exist and
    /// [`Error::EntryExists`] if `to` is taken.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let position = self.position(from).ok_or_else(|| Error::EntryNotFound {
            path: from.to_string(),
        })?;
        if from == to {
            return Ok(());
        }
        if self.contains(to) {
            return Err(Error::EntryExists {
                path: to.to_string(),
            });
        }
        self.index.remove(from);
        self.index.insert(to.to_string(), position);
        let (name, record) = &mut self.records[position];
        *name = to.to_string();
        match record {
            EntryRecord::Sealed(entry) => entry.set_name(to),
            EntryRecord::Streaming(s) => s.entry.set_name(to),
            EntryRecord::Pending(_) => {}
        }
        Ok(())
    }

    /// Iterates over names and records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryRecord<P>)> {
        self.records.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Iterates mutably over names and records in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut EntryRecord<P>)> {
        self.records.iter_mut().map(|(n, r)| (n.as_str(), r))
    }

    /// Iterates over sealed entries in insertion order.
    pub fn sealed_entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.records.iter().filter_map(|(_, r)| r.as_sealed())
    }

    /// Consumes the directory, returning names and records in order.
    pub fn into_records(self) -> Vec<(String, EntryRecord<P>)> {
        self.records
    }

    /// Returns true if any entry or the given totals require Zip64 under
    /// [`Zip64Policy::AsNecessary`].
    pub fn requires_zip64(&self, cd_offset: u64, cd_size: u64) -> bool {
        self.sealed_entries()
            .any(|e| e.to_central().needs_zip64(Zip64Policy::AsNecessary))
            || CentralDirectoryEnd::requires_zip64(self.len() as u64, cd_offset, cd_size)
    }

    /// Writes the central directory and end records at `cd_offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if an entry is not sealed and
    /// [`Error::Zip64Required`] if `policy` is [`Zip64Policy::Never`] and a
    /// value overflows.
    pub fn write_central_directory<W: Write>(
        &self,
        w: &mut W,
        cd_offset: u64,
        comment: &[u8],
        policy: Zip64Policy,
    ) -> Result<DirectorySummary> {
        let mut cd = Vec::new();
        for (name, record) in &self.records {
            match record {
                EntryRecord::Sealed(entry) => entry.to_central().write(&mut cd, policy)?,
                other => {
                    return Err(Error::invalid_state(format!(
                        "cannot write central directory: '{}' is {}",
                        name,
                        other.stage()
                    )));
                }
            }
        }
        w.write_all(&cd)?;
        let entries = self.records.len() as u64;
        let cd_size = cd.len() as u64;
        let zip64 = CentralDirectoryEnd::write_to(w, entries, cd_offset, cd_size, comment, policy)?;
        log::debug!(
            "central directory: {} entries, {} bytes at {:#x}{}",
            entries,
            cd_size,
            cd_offset,
            if zip64 { ", zip64" } else { "" }
        );
        Ok(DirectorySummary {
            entries,
            cd_offset,
            cd_size,
            zip64,
        })
    }

    /// Parses the central directory of an archive into sealed records.
    ///
    /// Duplicate names keep the first occurrence. `max_entries` bounds the
    /// declared entry count before anything is allocated.
    pub fn read<R: Read + Seek>(
        r: &mut R,
        max_entries: Option<u64>,
    ) -> Result<(Self, CentralDirectoryEnd)> {
        let end = CentralDirectoryEnd::read_from(r)?;
        if let Some(limit) = max_entries {
            if end.entries > limit {
                return Err(Error::ResourceLimitExceeded(format!(
                    "archive declares {} entries, limit is {}",
                    end.entries, limit
                )));
            }
        }
        r.seek(SeekFrom::Start(end.cd_offset))?;
        let cd_size = usize::try_from(end.cd_size).map_err(|_| {
            Error::ResourceLimitExceeded(format!("central directory of {} bytes", end.cd_size))
        })?;
        let raw = read_bytes(r, cd_size).map_err(|e| truncated(e, end.cd_offset, "central directory"))?;

        let mut directory = Self::new();
        let mut reader = ByteReader::new(&raw, end.cd_offset);
        for _ in 0..end.entries {
            let offset = reader.offset();
            let header = CentralDirectoryHeader::parse(&mut reader)?;
            let entry = ArchiveEntry::from_central(header, offset)?;
            if directory.contains(&entry.name) {
                log::warn!("duplicate entry '{}' at {:#x} ignored", entry.name, offset);
                continue;
            }
            directory.insert_sealed(entry)?;
        }
        if !reader.is_empty() {
            log::debug!(
                "{} trailing bytes after {} central headers",
                reader.remaining(),
                end.entries
            );
        }
        Ok((directory, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sealed(name: &str, offset: u64) -> ArchiveEntry {
        let mut e = ArchiveEntry::new(name);
        e.local_header_offset = offset;
        e.uncompressed_size = 3;
        e.compressed_size = 3;
        e
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_pending("a", ()).unwrap();
        assert!(matches!(dir.insert_pending("a", ()), Err(Error::EntryExists { .. })));
        assert!(matches!(dir.insert_sealed(sealed("a", 0)), Err(Error::EntryExists { .. })));
    }

    #[test]
    fn test_lifecycle() {
        let mut dir: ArchiveDirectory<u8> = ArchiveDirectory::new();
        dir.insert_pending("a", 7).unwrap();
        let pos = dir.begin_streaming(ArchiveEntry::new("a")).unwrap();
        assert_eq!(pos, 0);
        dir.streaming_mut(pos).unwrap().bytes_in += 3;
        dir.seal(pos, sealed("a", 0)).unwrap();
        assert!(dir.sealed("a").is_some());
        assert!(matches!(dir.seal(pos, sealed("a", 0)), Err(Error::InvalidState(_))));
        // A sealed record is not replaced by streaming
        assert!(matches!(dir.begin_streaming(ArchiveEntry::new("a")), Err(Error::EntryExists { .. })));
    }

    #[test]
    fn test_remove_keeps_order_and_index() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        for name in ["a", "b", "c", "d"] {
            dir.insert_pending(name, ()).unwrap();
        }
        assert!(dir.remove("b").is_some());
        assert!(dir.remove("b").is_none());
        let names: Vec<_> = dir.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "c", "d"]);
        assert_eq!(dir.position("d"), Some(2));
    }

    #[test]
    fn test_rename() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_sealed(sealed("a.txt", 0)).unwrap();
        dir.insert_sealed(sealed("b.txt", 10)).unwrap();
        dir.rename("a.txt", "a2.txt").unwrap();
        assert_eq!(dir.sealed("a2.txt").unwrap().name, "a2.txt");
        assert!(!dir.contains("a.txt"));
        assert_eq!(dir.position("a2.txt"), Some(0));
        assert!(matches!(dir.rename("a2.txt", "b.txt"), Err(Error::EntryExists { .. })));
        assert!(matches!(dir.rename("zz", "y"), Err(Error::EntryNotFound { .. })));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_central_directory_roundtrip() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_sealed(sealed("one", 0)).unwrap();
        dir.insert_sealed(sealed("dir/", 40)).unwrap();
        let mut buf = vec![0u8; 100];
        let summary = dir
            .write_central_directory(&mut buf, 100, b"comment", Zip64Policy::AsNecessary)
            .unwrap();
        assert_eq!(summary.entries, 2);
        assert!(!summary.zip64);

        let (parsed, end) = ArchiveDirectory::<()>::read(&mut Cursor::new(&buf), None).unwrap();
        assert_eq!(end.comment, b"comment");
        let names: Vec<_> = parsed.sealed_entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["one", "dir/"]);
        assert_eq!(parsed.sealed("dir/").unwrap().local_header_offset, 40);
    }

    #[test]
    fn test_unsealed_blocks_central_directory() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_pending("p", ()).unwrap();
        let err = dir
            .write_central_directory(&mut Vec::new(), 0, b"", Zip64Policy::AsNecessary)
            .unwrap_err();
        assert!(err.is_state_error());
    }

    #[test]
    fn test_max_entries_limit() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_sealed(sealed("a", 0)).unwrap();
        dir.insert_sealed(sealed("b", 0)).unwrap();
        let mut buf = Vec::new();
        dir.write_central_directory(&mut buf, 0, b"", Zip64Policy::AsNecessary).unwrap();
        let err = ArchiveDirectory::<()>::read(&mut Cursor::new(&buf), Some(1)).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_requires_zip64() {
        let mut dir: ArchiveDirectory<()> = ArchiveDirectory::new();
        dir.insert_sealed(sealed("a", 0)).unwrap();
        assert!(!dir.requires_zip64(0, 46));
        assert!(dir.requires_zip64(0x1_0000_0000, 46));
        dir.insert_sealed(sealed("big", 0xFFFF_FFFF)).unwrap();
        assert!(dir.requires_zip64(0, 92));
    }
}
