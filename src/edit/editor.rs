//! The editable archive.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use crate::directory::{ArchiveDirectory, ArchiveEntry, EntryRecord};
use crate::progress::ProgressReporter;
use crate::read::{Archive, EntrySelector, ExtractOptions, ExtractResult, ReadOptions};
use crate::write::{EntryMeta, EntryOptions, WriteOptions};
use crate::{ArchivePath, Error, Password, Result};

use super::SaveErrorPolicy;
use super::source::{BytesSource, EntrySource, FileSource};
use super::staged::PendingEntry;

/// A seekable source the editor can keep open between saves.
pub(crate) trait Backing: Read + Seek + Send {}

impl<T: Read + Seek + Send> Backing for T {}

/// An archive that can be modified and saved.
///
/// Entries loaded from an existing archive stay where they are until the
/// next save, which copies their stored bytes without decoding them. New
/// and updated entries keep a reference to their content and are encoded
/// only when saved.
///
/// # Example
///
/// ```rust,no_run
/// use zipforge::ZipFile;
///
/// let mut zip = ZipFile::open("project.zip")?;
/// zip.rename("README", "README.txt")?;
/// zip.remove("build.log")?;
/// zip.add_bytes("VERSION", b"1.2.0".to_vec())?;
/// zip.save()?;
/// # Ok::<(), zipforge::Error>(())
/// ```
pub struct ZipFile {
    pub(crate) path: Option<PathBuf>,
    pub(crate) backing: Option<Archive<Box<dyn Backing>>>,
    /// Stored name in `backing` of each saved entry, by header offset.
    pub(crate) origins: HashMap<u64, String>,
    pub(crate) entries: ArchiveDirectory<PendingEntry>,
    pub(crate) write_options: WriteOptions,
    pub(crate) read_options: ReadOptions,
    pub(crate) error_policy: SaveErrorPolicy,
    pub(crate) progress: Option<Box<dyn ProgressReporter>>,
    pub(crate) comment: Option<String>,
}

impl std::fmt::Debug for ZipFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipFile")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("pending", &self.pending_count())
            .field("error_policy", &self.error_policy)
            .finish_non_exhaustive()
    }
}

impl Default for ZipFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipFile {
    /// Creates an empty archive with no path. Save it with
    /// [`save_as`](Self::save_as) or [`save_to`](Self::save_to).
    pub fn new() -> Self {
        Self {
            path: None,
            backing: None,
            origins: HashMap::new(),
            entries: ArchiveDirectory::new(),
            write_options: WriteOptions::default(),
            read_options: ReadOptions::default(),
            error_policy: SaveErrorPolicy::default(),
            progress: None,
            comment: None,
        }
    }

    /// Creates an empty archive that [`save`](Self::save) writes to `path`.
    ///
    /// Nothing is written until the first save.
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::new()
        }
    }

    /// Opens an existing archive file for editing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a valid
    /// archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ReadOptions::default())
    }

    /// Opens an existing archive file with custom read options. The
    /// options' password is used when entries are read back.
    pub fn open_with_options(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut zip = Self::create(path);
        zip.read_options = options;
        zip.load_from(path)?;
        Ok(zip)
    }

    /// Opens an archive held by any seekable reader.
    ///
    /// The result has no path; save it with [`save_as`](Self::save_as) or
    /// [`save_to`](Self::save_to).
    pub fn from_reader(reader: impl Read + Seek + Send + 'static) -> Result<Self> {
        let mut zip = Self::new();
        let archive = Archive::open_with_options(Box::new(reader) as Box<dyn Backing>, ReadOptions::default())?;
        zip.load(archive);
        Ok(zip)
    }

    pub(crate) fn load_from(&mut self, path: &Path) -> Result<()> {
        let file = BufReader::new(File::open(path)?);
        let archive = Archive::open_with_options(Box::new(file) as Box<dyn Backing>, self.read_options.clone())?;
        self.load(archive);
        Ok(())
    }

    /// Replaces every record with the saved entries of `archive`.
    pub(crate) fn load(&mut self, archive: Archive<Box<dyn Backing>>) {
        let mut entries = ArchiveDirectory::new();
        let mut origins = HashMap::new();
        for entry in archive.entries() {
            origins.insert(entry.local_header_offset, entry.name.clone());
            // Duplicate names were already dropped by the directory reader.
            if entries.insert_sealed(entry.clone()).is_err() {
                log::warn!("ignoring duplicate entry '{}'", entry.name);
            }
        }
        self.comment = archive.comment().map(str::to_string);
        self.entries = entries;
        self.origins = origins;
        self.backing = Some(archive);
    }

    /// Returns the path [`save`](Self::save) writes to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Sets the options used to encode new and updated entries and to
    /// write the central directory.
    pub fn set_write_options(&mut self, options: WriteOptions) {
        self.write_options = options;
    }

    /// Returns the write options.
    pub fn write_options(&self) -> &WriteOptions {
        &self.write_options
    }

    /// Sets the password used to read back encrypted saved entries.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        let password = password.into();
        self.read_options.password = Some(password.clone());
        if let Some(archive) = self.backing.as_mut() {
            archive.set_password(password);
        }
    }

    /// Sets what a save does when an entry's content cannot be read.
    pub fn set_error_policy(&mut self, policy: SaveErrorPolicy) {
        self.error_policy = policy;
    }

    /// Installs a progress reporter for saves.
    pub fn set_progress(&mut self, progress: Box<dyn ProgressReporter>) {
        self.progress = Some(progress);
    }

    /// Returns the archive comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Sets or clears the archive comment.
    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    /// Returns the number of entries, saved or pending.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    /// Iterates over entry names in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name)
    }

    /// Returns the metadata of a saved entry.
    ///
    /// Entries added or updated since the last save have no metadata yet.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.sealed(name)
    }

    /// Returns true if `name` was added or updated since the last save.
    pub fn is_pending(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(EntryRecord::is_pending)
    }

    /// Returns the number of entries waiting to be encoded.
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_pending()).count()
    }

    fn insert(&mut self, path: ArchivePath, pending: PendingEntry) -> Result<()> {
        self.entries.insert_pending(path.into_string(), pending)?;
        Ok(())
    }

    /// Adds an entry with in-memory content.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntryName`] for a malformed name and
    /// [`Error::EntryExists`] if the name is taken.
    pub fn add_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.add_bytes_with(name, data, EntryOptions::new())
    }

    /// Adds an entry with in-memory content and per-entry options.
    pub fn add_bytes_with(
        &mut self,
        name: &str,
        data: impl Into<Vec<u8>>,
        options: EntryOptions,
    ) -> Result<()> {
        let path = ArchivePath::new(name)?;
        self.insert(path, PendingEntry::content(BytesSource::new(data), options))
    }

    /// Adds an entry whose content is read from `disk_path` at save time.
    ///
    /// The file is not opened now. Timestamps and attributes are taken
    /// from the file when it is written.
    pub fn add_file(&mut self, name: &str, disk_path: impl AsRef<Path>) -> Result<()> {
        self.add_file_with(name, disk_path, EntryOptions::new())
    }

    /// Adds a file entry with per-entry options.
    pub fn add_file_with(
        &mut self,
        name: &str,
        disk_path: impl AsRef<Path>,
        options: EntryOptions,
    ) -> Result<()> {
        let path = ArchivePath::new(name)?;
        self.insert(path, PendingEntry::content(FileSource::new(disk_path), options))
    }

    /// Adds an entry backed by any [`EntrySource`].
    pub fn add_stream_source(
        &mut self,
        name: &str,
        source: impl EntrySource + 'static,
        options: EntryOptions,
    ) -> Result<()> {
        let path = ArchivePath::new(name)?;
        self.insert(path, PendingEntry::content(source, options))
    }

    /// Adds a directory entry. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let path = ArchivePath::directory(name)?;
        self.insert(path, PendingEntry::directory(EntryMeta::new()))
    }

    /// Replaces the content of `name`, or adds it if absent.
    ///
    /// The entry keeps its position in the archive.
    pub fn update_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let path = ArchivePath::new(name)?;
        let pending = PendingEntry::content(BytesSource::new(data), EntryOptions::new());
        self.entries.upsert(path.as_str(), EntryRecord::Pending(pending));
        Ok(())
    }

    /// Replaces the content of `name` with a file read at save time, or
    /// adds it if absent.
    pub fn update_file(&mut self, name: &str, disk_path: impl AsRef<Path>) -> Result<()> {
        let path = ArchivePath::new(name)?;
        let pending = PendingEntry::content(FileSource::new(disk_path), EntryOptions::new());
        self.entries.upsert(path.as_str(), EntryRecord::Pending(pending));
        Ok(())
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if there is no such entry.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.entries.remove(name).map(|_| ()).ok_or_else(|| Error::EntryNotFound {
            path: name.to_string(),
        })
    }

    /// Renames an entry. The stored bytes are not touched.
    ///
    /// Renaming a directory entry renames only that entry, not the entries
    /// under it.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if `from` does not exist,
    /// [`Error::EntryExists`] if `to` is taken and
    /// [`Error::InvalidEntryName`] if `to` is malformed.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let to = if from.ends_with('/') {
            ArchivePath::directory(to)?
        } else {
            ArchivePath::new(to)?
        };
        self.entries.rename(from, to.as_str())
    }

    fn selected(&self, selector: &impl EntrySelector) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, record)| match record {
                EntryRecord::Pending(pending) => selector.select(&pending.preview(name)),
                EntryRecord::Sealed(entry) => selector.select(entry),
                EntryRecord::Streaming(_) => false,
            })
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Removes every entry chosen by `selector`, returning how many were
    /// removed.
    ///
    /// Pending entries are offered to the selector with their name and
    /// size hint only.
    pub fn remove_selected(&mut self, selector: impl EntrySelector) -> usize {
        let names = self.selected(&selector);
        for name in &names {
            self.entries.remove(name);
        }
        names.len()
    }

    /// Extracts the saved entries chosen by `selector` into `dest`, using
    /// their current names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if a selected entry has not been
    /// saved yet.
    pub fn extract_selected(
        &mut self,
        dest: impl AsRef<Path>,
        selector: impl EntrySelector,
        options: ExtractOptions,
    ) -> Result<ExtractResult> {
        let mut jobs = Vec::new();
        for name in self.selected(&selector) {
            let (stored, entry) = self.saved_origin(&name)?;
            jobs.push((stored, entry));
        }
        let archive = self.backing_mut()?;
        archive.extract_entries(dest.as_ref(), jobs, options)
    }

    /// Reads the decoded content of a saved entry.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if there is no such entry and
    /// [`Error::InvalidState`] if it was added or updated since the last
    /// save.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let (stored, _) = self.saved_origin(name)?;
        self.backing_mut()?.read_entry(&stored)
    }

    /// Returns the stored name in the backing archive and the current
    /// metadata of a saved entry.
    fn saved_origin(&self, name: &str) -> Result<(String, ArchiveEntry)> {
        match self.entries.get(name) {
            None => Err(Error::EntryNotFound {
                path: name.to_string(),
            }),
            Some(EntryRecord::Sealed(entry)) => {
                let stored = self.origins.get(&entry.local_header_offset).ok_or_else(|| {
                    Error::invalid_state(format!("'{name}' has no stored payload"))
                })?;
                Ok((stored.clone(), entry.clone()))
            }
            Some(_) => Err(Error::invalid_state(format!(
                "'{name}' must be saved before it can be extracted"
            ))),
        }
    }

    pub(crate) fn backing_mut(&mut self) -> Result<&mut Archive<Box<dyn Backing>>> {
        self.backing
            .as_mut()
            .ok_or_else(|| Error::invalid_state("no saved archive is loaded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::Writer;
    use std::io::Cursor;

    fn saved(entries: &[(&str, &[u8])]) -> ZipFile {
        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
        for (name, data) in entries {
            writer.add_bytes(ArchivePath::new(name).unwrap(), data).unwrap();
        }
        let (_, cursor) = writer.finish_into_inner().unwrap();
        ZipFile::from_reader(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let mut zip = saved(&[("a.txt", b"a")]);
        let err = zip.add_bytes("a.txt", b"again".to_vec()).unwrap_err();
        assert!(matches!(err, Error::EntryExists { .. }));
        zip.add_bytes("b.txt", b"b".to_vec()).unwrap();
        assert!(matches!(
            zip.add_file("b.txt", "/tmp/whatever"),
            Err(Error::EntryExists { .. })
        ));
    }

    #[test]
    fn test_update_keeps_position() {
        let mut zip = saved(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        zip.update_bytes("b", b"two".to_vec()).unwrap();
        zip.update_bytes("d", b"4".to_vec()).unwrap();
        assert_eq!(zip.names().collect::<Vec<_>>(), ["a", "b", "c", "d"]);
        assert!(zip.is_pending("b"));
        assert!(!zip.is_pending("a"));
        assert_eq!(zip.pending_count(), 2);
    }

    #[test]
    fn test_read_pending_entry_is_state_error() {
        let mut zip = saved(&[("a", b"1")]);
        zip.add_bytes("new", b"unsaved".to_vec()).unwrap();
        assert!(zip.read_entry("new").unwrap_err().is_state_error());
        assert_eq!(zip.read_entry("a").unwrap(), b"1");
        assert!(matches!(zip.read_entry("zzz"), Err(Error::EntryNotFound { .. })));
    }

    #[test]
    fn test_rename_then_read() {
        let mut zip = saved(&[("a.txt", b"alpha"), ("b.txt", b"beta")]);
        zip.rename("a.txt", "docs/a.txt").unwrap();
        assert!(!zip.contains("a.txt"));
        assert_eq!(zip.read_entry("docs/a.txt").unwrap(), b"alpha");
        assert!(matches!(zip.rename("b.txt", "docs/a.txt"), Err(Error::EntryExists { .. })));
        assert!(matches!(zip.rename("nope", "x"), Err(Error::EntryNotFound { .. })));
        assert!(matches!(zip.rename("b.txt", "../x"), Err(Error::InvalidEntryName(_))));
    }

    #[test]
    fn test_remove_and_remove_selected() {
        let mut zip = saved(&[("logs/1.log", b"1"), ("logs/2.log", b"2"), ("keep.txt", b"k")]);
        zip.add_bytes("logs/3.log", b"3".to_vec()).unwrap();
        let removed = zip.remove_selected(|e: &ArchiveEntry| e.name.ends_with(".log"));
        assert_eq!(removed, 3);
        assert_eq!(zip.names().collect::<Vec<_>>(), ["keep.txt"]);
        assert!(matches!(zip.remove("logs/1.log"), Err(Error::EntryNotFound { .. })));
        zip.remove("keep.txt").unwrap();
        assert!(zip.is_empty());
    }

    #[test]
    fn test_extract_selected_uses_current_names() {
        let mut zip = saved(&[("a.txt", b"alpha"), ("b.txt", b"beta")]);
        zip.rename("a.txt", "renamed.txt").unwrap();
        let dest = tempfile::tempdir().unwrap();
        let result = zip
            .extract_selected(dest.path(), crate::read::SelectByName::new(["renamed.txt"]), ExtractOptions::new())
            .unwrap();
        assert_eq!(result.entries_extracted, 1);
        assert_eq!(std::fs::read(dest.path().join("renamed.txt")).unwrap(), b"alpha");
        assert!(!dest.path().join("a.txt").exists());

        zip.add_bytes("new.txt", b"n".to_vec()).unwrap();
        let err = zip.extract_selected(dest.path(), (), ExtractOptions::new()).unwrap_err();
        assert!(err.is_state_error());
    }

    #[test]
    fn test_new_has_no_backing() {
        let mut zip = ZipFile::new();
        assert!(zip.is_empty());
        assert!(zip.path().is_none());
        assert!(zip.backing_mut().unwrap_err().is_state_error());
    }
}
