//! Writing an edited archive.
//!
//! Every save builds a complete new archive in a temporary file. Saved
//! entries are copied stored-bytes-for-stored-bytes from the loaded archive
//! with regenerated headers; pending entries go through the full encoding
//! pipeline. The destination is only touched once the new archive is
//! complete.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::directory::EntryRecord;
use crate::read::{Archive, ReadLimits, ReadOptions};
use crate::write::{ArchiveSink, Writer};
use crate::{ArchivePath, Error, Result};

use super::editor::{Backing, ZipFile};
use super::staged::WriteFailure;
use super::{SaveErrorPolicy, SaveResult};

impl ZipFile {
    /// Saves to the path the archive was opened from or created with, then
    /// reloads from the saved file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the archive has no path. On any
    /// error the file at the path is left unchanged.
    pub fn save(&mut self) -> Result<SaveResult> {
        let path = self.path.clone().ok_or_else(|| {
            Error::invalid_state("archive has no path; use save_as or save_to")
        })?;
        self.save_as(path)
    }

    /// Saves to `path` atomically and makes it the archive's path.
    ///
    /// The archive is written to a temporary file in the same directory and
    /// renamed over `path` on success. Afterwards every entry is a saved
    /// entry of the new file.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<SaveResult> {
        let dest = path.as_ref();
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        let result = self.write_to_file(staged.as_file_mut())?;
        staged.as_file().sync_all()?;

        let replacing_backing = self.path.as_deref() == Some(dest) && self.backing.is_some();
        if replacing_backing {
            // Some platforms refuse to rename over an open file.
            self.backing = None;
        }
        if let Err(e) = staged.persist(dest) {
            if replacing_backing {
                self.reopen_backing(dest)?;
            }
            return Err(Error::Io(e.error));
        }
        self.path = Some(dest.to_path_buf());
        self.load_from(dest)?;
        log::debug!(
            "saved {} entries to {} ({} bytes)",
            self.entries.len(),
            dest.display(),
            result.archive_size
        );
        Ok(result)
    }

    /// Writes the archive to `out`.
    ///
    /// The archive is assembled in an anonymous temporary file first, so
    /// nothing reaches `out` unless the whole archive was built. The edit
    /// state is kept: pending entries stay pending.
    pub fn save_to<W: Write>(&mut self, mut out: W) -> Result<SaveResult> {
        let mut staged = tempfile::tempfile()?;
        let result = self.write_to_file(&mut staged)?;
        staged.seek(SeekFrom::Start(0))?;
        io::copy(&mut staged, &mut out)?;
        out.flush()?;
        Ok(result)
    }

    /// Reopens the unchanged file after a failed rename, keeping the
    /// pending edits.
    fn reopen_backing(&mut self, path: &Path) -> Result<()> {
        let file = io::BufReader::new(File::open(path)?);
        let archive = Archive::open_with_options(Box::new(file) as Box<dyn Backing>, self.read_options.clone())?;
        self.backing = Some(archive);
        Ok(())
    }

    /// Builds the archive in `file` and checks that it opens.
    ///
    /// An entry dropped under [`SaveErrorPolicy::Skip`] is rewound over but
    /// its bytes stay in the file, so the file is cut back to the end of
    /// the archive before anything reads it.
    fn write_to_file(&mut self, file: &mut File) -> Result<SaveResult> {
        let sink = BufWriter::with_capacity(self.write_options.buffer_size, &mut *file);
        let writer = Writer::create(sink)?;
        let (result, sink) = self.write_archive(writer)?;
        sink.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.set_len(result.archive_size)?;

        file.seek(SeekFrom::Start(0))?;
        let check = ReadOptions::new().limits(ReadLimits::unlimited());
        let staged = Archive::open_with_options(io::BufReader::new(&mut *file), check)?;
        if staged.len() != self.entries.len() - result.skipped.len() {
            return Err(Error::invalid_state(format!(
                "staged archive lists {} entries, expected {}",
                staged.len(),
                self.entries.len() - result.skipped.len()
            )));
        }
        Ok(result)
    }

    fn write_archive<S: ArchiveSink>(
        &mut self,
        writer: Writer<S>,
    ) -> Result<(SaveResult, S::Inner)> {
        let mut options = self.write_options.clone();
        options.comment = self.comment.clone().or(options.comment);
        let mut writer = writer.options(options);

        let mut progress = self.progress.take();
        if let Some(p) = progress.as_mut() {
            p.on_save_start(self.entries.len());
        }
        if let Some(p) = progress {
            writer.set_progress(p);
        }
        let written = self.write_entries(&mut writer);
        let mut progress = writer.take_progress();
        let outcome = written.and_then(|mut result| {
            let (summary, inner) = writer.finish_into_inner()?;
            result.archive_size = summary.archive_size;
            result.total_size = summary.total_size;
            result.compressed_size = summary.compressed_size;
            result.zip64 = summary.zip64;
            Ok((result, inner))
        });
        if let Some(p) = progress.as_mut() {
            p.on_save_complete(outcome.is_ok());
        }
        self.progress = progress;
        outcome
    }

    fn write_entries<S: ArchiveSink>(&mut self, writer: &mut Writer<S>) -> Result<SaveResult> {
        let Self {
            entries,
            backing,
            origins,
            error_policy,
            ..
        } = self;
        let mut result = SaveResult::default();
        for (name, record) in entries.iter_mut() {
            match record {
                EntryRecord::Sealed(entry) => {
                    let stored = origins.get(&entry.local_header_offset).ok_or_else(|| {
                        Error::invalid_state(format!("'{name}' has no stored payload"))
                    })?;
                    let archive = backing
                        .as_mut()
                        .ok_or_else(|| Error::invalid_state("no saved archive is loaded"))?;
                    let (source, mut raw) = archive.raw_payload(stored)?;
                    writer.add_raw(&source, ArchivePath::new(name)?, &mut raw)?;
                    result.entries_copied += 1;
                }
                EntryRecord::Pending(pending) => match pending.write(name, writer) {
                    Ok(_) => result.entries_encoded += 1,
                    Err(WriteFailure::Source(e)) if *error_policy == SaveErrorPolicy::Skip => {
                        log::warn!("skipping '{}': {}", name, e);
                        result.skipped.push((name.to_string(), e.to_string()));
                    }
                    Err(failure) => return Err(failure.into_error()),
                },
                EntryRecord::Streaming(_) => {
                    return Err(Error::invalid_state(format!(
                        "'{name}' is still being written"
                    )));
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressReporter;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_save_requires_path() {
        let mut zip = ZipFile::new();
        zip.add_bytes("a", b"a".to_vec()).unwrap();
        assert!(zip.save().unwrap_err().is_state_error());
    }

    #[test]
    fn test_save_reloads_as_saved_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zip");
        let mut zip = ZipFile::create(&path);
        zip.add_bytes("a.txt", b"alpha".to_vec()).unwrap();
        zip.add_directory("d").unwrap();
        let result = zip.save().unwrap();
        assert_eq!(result.entries_encoded, 2);
        assert_eq!(zip.pending_count(), 0);
        assert_eq!(zip.entry("a.txt").unwrap().uncompressed_size, 5);
        assert!(zip.entry("d/").unwrap().is_dir());
        assert_eq!(zip.read_entry("a.txt").unwrap(), b"alpha");
    }

    #[test]
    fn test_abort_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.zip");
        let mut zip = ZipFile::create(&path);
        zip.add_bytes("a.txt", b"alpha".to_vec()).unwrap();
        zip.save().unwrap();
        let before = std::fs::read(&path).unwrap();

        zip.add_file("gone.txt", dir.path().join("missing")).unwrap();
        let err = zip.save().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        // Nothing but the archive itself is left in the directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(zip.is_pending("gone.txt"));
        assert_eq!(zip.read_entry("a.txt").unwrap(), b"alpha");
    }

    #[test]
    fn test_skip_policy_drops_unreadable_sources() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"here").unwrap();
        let path = dir.path().join("skip.zip");

        let mut zip = ZipFile::create(&path);
        zip.set_error_policy(SaveErrorPolicy::Skip);
        zip.add_file("present.txt", &present).unwrap();
        zip.add_file("absent.txt", dir.path().join("absent.txt")).unwrap();
        let result = zip.save().unwrap();
        assert_eq!(result.entries_encoded, 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].0, "absent.txt");
        assert_eq!(zip.names().collect::<Vec<_>>(), ["present.txt"]);
        assert_eq!(zip.read_entry("present.txt").unwrap(), b"here");
    }

    #[test]
    fn test_save_to_keeps_pending_state() {
        let mut zip = ZipFile::new();
        zip.add_bytes("x", b"content".to_vec()).unwrap();
        zip.set_comment(Some("made in memory".into()));
        let mut first = Vec::new();
        zip.save_to(&mut first).unwrap();
        let mut second = Vec::new();
        zip.save_to(&mut second).unwrap();
        assert!(zip.is_pending("x"));

        let mut archive = Archive::open(io::Cursor::new(first)).unwrap();
        assert_eq!(archive.comment(), Some("made in memory"));
        assert_eq!(archive.read_entry("x").unwrap(), b"content");
        let mut archive = Archive::open(io::Cursor::new(second)).unwrap();
        assert_eq!(archive.read_entry("x").unwrap(), b"content");
    }

    #[test]
    fn test_save_as_moves_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        let mut zip = ZipFile::create(&first);
        zip.add_bytes("a", b"1".to_vec()).unwrap();
        zip.save().unwrap();
        zip.rename("a", "b").unwrap();
        zip.save_as(&second).unwrap();
        assert_eq!(zip.path(), Some(second.as_path()));
        assert!(Archive::open_path(&first).unwrap().contains("a"));
        assert!(Archive::open_path(&second).unwrap().contains("b"));
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ProgressReporter for Recorder {
        fn on_save_start(&mut self, entries: usize) {
            self.0.lock().unwrap().push(format!("start {entries}"));
        }
        fn on_entry_start(&mut self, name: &str, _size: u64) {
            self.0.lock().unwrap().push(format!("entry {name}"));
        }
        fn on_save_complete(&mut self, success: bool) {
            self.0.lock().unwrap().push(format!("done {success}"));
        }
    }

    #[test]
    fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.zip");
        let recorder = Recorder::default();
        let mut zip = ZipFile::create(&path);
        zip.set_progress(Box::new(recorder.clone()));
        zip.add_bytes("a", b"1".to_vec()).unwrap();
        zip.save().unwrap();
        zip.add_bytes("b", b"2".to_vec()).unwrap();
        zip.save().unwrap();
        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            ["start 1", "entry a", "done true", "start 2", "entry a", "entry b", "done true"]
        );
    }
}
