//! Integration tests for archive editing.
//!
//! These tests verify that [`ZipFile`]:
//! - Renames and removes entries without touching stored bytes
//! - Updates entry content in place
//! - Adds entries to existing archives
//! - Produces byte-identical archives when saved repeatedly without changes
//! - Returns the right error classes for invalid operations

mod common;

use std::io::Cursor;

use zipforge::crypto::AesStrength;
use zipforge::edit::{EntrySource, ReaderSource, SaveErrorPolicy};
use zipforge::read::SelectByPrefix;
use zipforge::{
    Archive, CompressionMethod, EntryOptions, Error, ExtractOptions, WriteOptions, ZipFile,
};

/// Reads an archive file and returns (name, content) for every file entry.
fn read_archive_contents(path: &std::path::Path) -> zipforge::Result<Vec<(String, Vec<u8>)>> {
    let mut archive = Archive::open_path(path)?;
    let names: Vec<String> = archive
        .entries()
        .filter(|e| e.is_file())
        .map(|e| e.name.clone())
        .collect();
    let mut contents = Vec::new();
    for name in names {
        let data = archive.read_entry(&name)?;
        contents.push((name, data));
    }
    Ok(contents)
}

fn write_fixture(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    std::fs::write(path, common::create_archive(entries).unwrap()).unwrap();
}

// ============================================================================
// Scenario tests
// ============================================================================

#[test]
fn test_rename_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.zip");
    let random = common::random_bytes(5000, 42);

    let mut zip = ZipFile::create(&path);
    zip.add_bytes("a.txt", b"0123456789".to_vec()).unwrap();
    zip.add_bytes("b.bin", random.clone()).unwrap();
    zip.add_bytes("c.txt", Vec::new()).unwrap();
    let first = zip.save().unwrap();
    assert_eq!(first.entries_encoded, 3);

    let mut zip = ZipFile::open(&path).unwrap();
    zip.rename("a.txt", "a2.txt").unwrap();
    let second = zip.save().unwrap();
    assert_eq!(second.entries_copied, 3);
    assert_eq!(second.entries_encoded, 0);

    let mut archive = Archive::open_path(&path).unwrap();
    assert_eq!(archive.len(), 3);
    let names: Vec<&str> = archive.entries().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a2.txt", "b.bin", "c.txt"]);
    assert!(!archive.contains("a.txt"));
    assert_eq!(archive.read_entry("a2.txt").unwrap(), b"0123456789");
    assert_eq!(archive.read_entry("b.bin").unwrap(), random);
    assert_eq!(archive.read_entry("c.txt").unwrap(), b"");
    assert!(archive.test().unwrap().is_ok());
}

#[test]
fn test_idempotent_save_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycles.zip");

    let mut zip = ZipFile::create(&path);
    zip.set_write_options(WriteOptions::new().comment("cycle test"));
    zip.add_bytes("text.txt", common::text_bytes(10_000)).unwrap();
    zip.add_bytes("random.bin", common::random_bytes(3000, 9)).unwrap();
    zip.add_bytes_with(
        "secret.txt",
        b"hidden".to_vec(),
        EntryOptions::new()
            .encryption(zipforge::EncryptionMethod::Aes(AesStrength::Aes256))
            .unwrap()
            .password("pw"),
    )
    .unwrap();
    zip.add_directory("empty-dir").unwrap();
    zip.save().unwrap();

    let mut previous: Option<Vec<u8>> = None;
    for cycle in 0..30 {
        let mut reopened = ZipFile::open(&path).unwrap();
        let result = reopened.save().unwrap();
        assert_eq!(result.entries_copied, 4, "cycle {cycle}");
        let bytes = std::fs::read(&path).unwrap();
        if let Some(previous) = &previous {
            assert_eq!(&bytes, previous, "cycle {cycle} changed the archive");
        }
        previous = Some(bytes);
    }

    let mut archive = Archive::open_path(&path).unwrap();
    assert_eq!(archive.comment(), Some("cycle test"));
    assert_eq!(archive.read_entry_with_password("secret.txt", "pw").unwrap(), b"hidden");
}

// ============================================================================
// Remove / rename / update
// ============================================================================

#[test]
fn test_remove_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remove.zip");
    write_fixture(
        &path,
        &[
            ("keep.txt", b"Keep this"),
            ("delete.txt", b"Delete this"),
            ("also_keep.txt", b"Also keep"),
        ],
    );

    let mut zip = ZipFile::open(&path).unwrap();
    zip.remove("delete.txt").unwrap();
    let result = zip.save().unwrap();
    assert_eq!(result.total_entries(), 2);

    let contents = read_archive_contents(&path).unwrap();
    let names: Vec<&str> = contents.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["keep.txt", "also_keep.txt"]);
}

#[test]
fn test_remove_missing_entry() {
    let mut zip = ZipFile::new();
    let err = zip.remove("nope.txt").unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { ref path } if path == "nope.txt"));
}

#[test]
fn test_rename_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rename.zip");
    write_fixture(&path, &[("a.txt", b"a"), ("b.txt", b"b")]);

    let mut zip = ZipFile::open(&path).unwrap();
    assert!(matches!(
        zip.rename("missing", "x").unwrap_err(),
        Error::EntryNotFound { .. }
    ));
    assert!(matches!(
        zip.rename("a.txt", "b.txt").unwrap_err(),
        Error::EntryExists { .. }
    ));
    assert!(zip.rename("a.txt", "../escape").unwrap_err().is_argument_error());
    // Nothing changed.
    assert_eq!(zip.names().collect::<Vec<_>>(), ["a.txt", "b.txt"]);
}

#[test]
fn test_rename_keeps_stored_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stored.zip");
    let data = common::text_bytes(8000);
    write_fixture(&path, &[("old/name.txt", &data)]);

    let before = Archive::open_path(&path).unwrap().entry("old/name.txt").cloned().unwrap();
    let mut zip = ZipFile::open(&path).unwrap();
    zip.rename("old/name.txt", "new/name.txt").unwrap();
    zip.save().unwrap();

    let mut archive = Archive::open_path(&path).unwrap();
    let after = archive.entry("new/name.txt").cloned().unwrap();
    assert_eq!(after.crc32, before.crc32);
    assert_eq!(after.compressed_size, before.compressed_size);
    assert_eq!(after.method_id, before.method_id);
    assert_eq!(after.dos_time, before.dos_time);
    assert_eq!(archive.read_entry("new/name.txt").unwrap(), data);
}

#[test]
fn test_update_keeps_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("update.zip");
    write_fixture(&path, &[("first", b"1"), ("second", b"2"), ("third", b"3")]);

    let mut zip = ZipFile::open(&path).unwrap();
    zip.update_bytes("second", b"two".to_vec()).unwrap();
    zip.update_bytes("fourth", b"4".to_vec()).unwrap();
    let result = zip.save().unwrap();
    assert_eq!(result.entries_copied, 2);
    assert_eq!(result.entries_encoded, 2);

    let contents = read_archive_contents(&path).unwrap();
    assert_eq!(
        contents,
        vec![
            ("first".to_string(), b"1".to_vec()),
            ("second".to_string(), b"two".to_vec()),
            ("third".to_string(), b"3".to_vec()),
            ("fourth".to_string(), b"4".to_vec()),
        ]
    );
}

#[test]
fn test_add_to_existing_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("add.zip");
    let disk_file = dir.path().join("disk.txt");
    std::fs::write(&disk_file, b"from disk").unwrap();
    write_fixture(&path, &[("existing.txt", b"existing")]);

    let mut zip = ZipFile::open(&path).unwrap();
    assert!(matches!(
        zip.add_bytes("existing.txt", b"dup".to_vec()).unwrap_err(),
        Error::EntryExists { .. }
    ));
    zip.add_file("disk.txt", &disk_file).unwrap();
    zip.add_stream_source(
        "stream.txt",
        ReaderSource::new(Cursor::new(b"streamed".to_vec())),
        EntryOptions::new(),
    )
    .unwrap();
    assert_eq!(zip.pending_count(), 2);
    zip.save().unwrap();
    assert_eq!(zip.pending_count(), 0);

    assert_eq!(zip.read_entry("disk.txt").unwrap(), b"from disk");
    assert_eq!(zip.read_entry("stream.txt").unwrap(), b"streamed");
    assert_eq!(zip.read_entry("existing.txt").unwrap(), b"existing");
}

#[test]
fn test_read_pending_entry_is_state_error() {
    let mut zip = ZipFile::new();
    zip.add_bytes("new.txt", b"new".to_vec()).unwrap();
    assert!(zip.read_entry("new.txt").unwrap_err().is_state_error());
    assert!(matches!(
        zip.read_entry("other.txt").unwrap_err(),
        Error::EntryNotFound { .. }
    ));
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_remove_and_extract_selected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("select.zip");
    write_fixture(
        &path,
        &[
            ("logs/a.log", b"a"),
            ("logs/b.log", b"b"),
            ("src/main.rs", b"fn main() {}"),
        ],
    );

    let mut zip = ZipFile::open(&path).unwrap();
    zip.rename("src/main.rs", "src/lib.rs").unwrap();
    let out = dir.path().join("out");
    let extracted = zip
        .extract_selected(&out, SelectByPrefix::new("src"), ExtractOptions::default())
        .unwrap();
    assert_eq!(extracted.entries_extracted, 1);
    assert_eq!(std::fs::read(out.join("src/lib.rs")).unwrap(), b"fn main() {}");

    assert_eq!(zip.remove_selected(SelectByPrefix::new("logs")), 2);
    zip.save().unwrap();
    let names = common::entry_names(&std::fs::read(&path).unwrap());
    assert_eq!(names, ["src/lib.rs"]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_failed_save_leaves_file_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abort.zip");
    write_fixture(&path, &[("a.txt", b"alpha")]);
    let before = std::fs::read(&path).unwrap();

    let mut zip = ZipFile::open(&path).unwrap();
    zip.rename("a.txt", "renamed.txt").unwrap();
    zip.add_file("missing.txt", dir.path().join("does-not-exist")).unwrap();
    assert!(matches!(zip.save().unwrap_err(), Error::Io(_)));

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(zip.contains("renamed.txt"));
    assert!(zip.is_pending("missing.txt"));

    zip.set_error_policy(SaveErrorPolicy::Skip);
    let result = zip.save().unwrap();
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(common::entry_names(&std::fs::read(&path).unwrap()), ["renamed.txt"]);
}

/// Yields `good` bytes of content, then fails.
struct FailsPartway {
    good: usize,
}

struct FailingReader {
    left: usize,
}

impl std::io::Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.left == 0 {
            return Err(std::io::Error::other("device went away"));
        }
        let n = buf.len().min(self.left);
        buf[..n].fill(b'x');
        self.left -= n;
        Ok(n)
    }
}

impl EntrySource for FailsPartway {
    fn open(&mut self) -> std::io::Result<Box<dyn std::io::Read + '_>> {
        Ok(Box::new(FailingReader { left: self.good }))
    }
}

#[test]
fn test_skipped_partial_entry_leaves_no_stale_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skip.zip");
    let mut zip = ZipFile::create(&path);
    zip.set_error_policy(SaveErrorPolicy::Skip);
    zip.add_bytes("keep.txt", b"kept".to_vec()).unwrap();
    zip.add_stream_source(
        "broken.bin",
        FailsPartway { good: 300_000 },
        EntryOptions::new().method(CompressionMethod::Stored),
    )
    .unwrap();

    let mut streamed = Vec::new();
    let result = zip.save_to(&mut streamed).unwrap();
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].0, "broken.bin");
    assert_eq!(streamed.len() as u64, result.archive_size);
    assert_eq!(common::entry_names(&streamed), ["keep.txt"]);

    let result = zip.save().unwrap();
    assert_eq!(result.skipped[0].0, "broken.bin");
    let saved = std::fs::read(&path).unwrap();
    assert!(saved.len() < 1000, "archive kept {} bytes", saved.len());
    assert_eq!(read_archive_contents(&path).unwrap(), [("keep.txt".to_string(), b"kept".to_vec())]);
    assert_eq!(zip.names().collect::<Vec<_>>(), ["keep.txt"]);
}

#[test]
fn test_one_shot_source_fails_second_save() {
    let mut zip = ZipFile::new();
    zip.add_stream_source(
        "once.txt",
        ReaderSource::new(Cursor::new(b"once".to_vec())),
        EntryOptions::new(),
    )
    .unwrap();
    let mut first = Vec::new();
    zip.save_to(&mut first).unwrap();
    let mut second = Vec::new();
    assert!(zip.save_to(&mut second).is_err());
    assert!(second.is_empty());

    let mut archive = Archive::open(Cursor::new(first)).unwrap();
    assert_eq!(archive.read_entry("once.txt").unwrap(), b"once");
}

#[test]
fn test_edit_encrypted_archive_without_password() {
    // Saved entries are copied without decrypting them.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enc.zip");
    let options = WriteOptions::new().zipcrypto().password("pw");
    std::fs::write(
        &path,
        common::create_archive_with_options(options, &[("a.txt", b"alpha"), ("b.txt", b"beta")])
            .unwrap(),
    )
    .unwrap();

    let mut zip = ZipFile::open(&path).unwrap();
    zip.rename("b.txt", "c.txt").unwrap();
    zip.save().unwrap();

    let mut archive = Archive::open_path_with_password(&path, "pw").unwrap();
    assert_eq!(archive.read_entry("a.txt").unwrap(), b"alpha");
    assert_eq!(archive.read_entry("c.txt").unwrap(), b"beta");
}
