//! Copying entries between archives without recompression.
//!
//! The stored bytes of an entry (encryption header, ciphertext and AES
//! authentication code included) are moved verbatim. Only the headers are
//! regenerated, so an entry can be renamed or relocated without knowing
//! its password.

use std::io::{self, Read};

use crate::directory::ArchiveEntry;
use crate::format::{
    DataDescriptor, LocalFileHeader, LocalZip64, Zip64Policy, flags, overflows_u32,
};
use crate::{ArchivePath, Error, Result};

use super::Writer;
use super::WriterState;
use super::sink::ArchiveSink;

impl<S: ArchiveSink> Writer<S> {
    /// Appends the stored payload of `source` under `path`.
    ///
    /// `raw` must yield the entry's stored bytes, starting right after its
    /// local header. Exactly `source.compressed_size` bytes are consumed.
    ///
    /// The CRC and sizes are taken from `source`. They are repeated in a
    /// data descriptor on a forward-only sink and for entries that already
    /// used one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the writer is `Closed`
    /// - [`Error::EntryExists`] if the name was already written
    /// - [`Error::InvalidFormat`] if `raw` ends early
    pub fn add_raw(
        &mut self,
        source: &ArchiveEntry,
        path: ArchivePath,
        raw: &mut dyn Read,
    ) -> Result<ArchiveEntry> {
        if self.state != WriterState::Closed {
            return Err(Error::invalid_state(format!(
                "cannot copy an entry: writer is {:?}",
                self.state
            )));
        }
        if self.directory.contains(path.as_str()) {
            return Err(Error::EntryExists {
                path: path.into_string(),
            });
        }

        let mut entry = source.clone();
        if entry.name != path.as_str() {
            entry.set_name(path.as_str());
        }

        // A ZipCrypto header checked against the DOS time only decodes with
        // flag bit 3 set, so descriptor entries stay descriptor entries.
        let deferred = !self.sink.supports_patch() || source.has_data_descriptor();
        if deferred {
            entry.flags |= flags::DATA_DESCRIPTOR;
        }
        let overflow =
            overflows_u32(entry.compressed_size) || overflows_u32(entry.uncompressed_size);
        let local_zip64 = match self.options.zip64 {
            Zip64Policy::Never if overflow => {
                return Err(Error::Zip64Required {
                    field: "entry size",
                    value: entry.compressed_size.max(entry.uncompressed_size),
                });
            }
            Zip64Policy::Never => LocalZip64::None,
            Zip64Policy::Always => LocalZip64::Extra,
            Zip64Policy::AsNecessary if overflow || (deferred && source.zip64) => LocalZip64::Extra,
            Zip64Policy::AsNecessary => LocalZip64::None,
        };
        entry.zip64 = local_zip64 == LocalZip64::Extra;

        let header_offset = self.sink.position();
        entry.local_header_offset = header_offset;
        let header = LocalFileHeader {
            version_needed: entry.version_needed(),
            flags: entry.flags,
            method: entry.stored_method(),
            modified: entry.dos_time,
            crc32: if deferred { 0 } else { entry.crc32 },
            compressed_size: if deferred { 0 } else { entry.compressed_size },
            uncompressed_size: if deferred { 0 } else { entry.uncompressed_size },
            name: entry.raw_name.clone(),
            extra: entry.extra_fields(),
            zip64: local_zip64,
        };

        if let Some(progress) = self.progress.as_mut() {
            progress.on_entry_start(&entry.name, entry.uncompressed_size);
        }
        if let Err(e) = self.copy_raw(&header, &entry, raw, deferred) {
            if let Some(progress) = self.progress.as_mut() {
                progress.on_entry_complete(&entry.name, false);
            }
            if self.sink.supports_patch() {
                self.sink.rewind_to(header_offset)?;
            }
            return Err(e);
        }

        log::debug!(
            "copied '{}' ({} stored bytes) to {:#x}",
            entry.name,
            entry.compressed_size,
            header_offset
        );
        self.directory.insert_sealed(entry.clone())?;
        self.record_sealed(&entry);
        Ok(entry)
    }

    fn copy_raw(
        &mut self,
        header: &LocalFileHeader,
        entry: &ArchiveEntry,
        raw: &mut dyn Read,
        deferred: bool,
    ) -> Result<()> {
        header.write_to(&mut self.sink)?;
        let copied = io::copy(&mut raw.take(entry.compressed_size), &mut self.sink)?;
        if copied != entry.compressed_size {
            return Err(Error::InvalidFormat(format!(
                "payload of '{}' ended after {} of {} bytes",
                entry.name, copied, entry.compressed_size
            )));
        }
        if deferred {
            DataDescriptor {
                crc32: entry.crc32,
                compressed_size: entry.compressed_size,
                uncompressed_size: entry.uncompressed_size,
            }
            .write_to(&mut self.sink, entry.zip64)?;
        }
        Ok(())
    }
}
