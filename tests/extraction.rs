//! Extraction to disk: selectors, overwrite policies, timestamps and
//! progress reporting.

mod common;

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use zipforge::read::{OverwritePolicy, SelectByName, SelectByPrefix, SelectFilesOnly};
use zipforge::{
    Archive, ArchivePath, EntryOptions, ExtractOptions, ProgressReporter, Timestamp, Writer,
    progress_fn,
};

fn project_archive() -> Vec<u8> {
    let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
    writer
        .add_directory(ArchivePath::new("project").unwrap(), Default::default())
        .unwrap();
    writer
        .add_bytes(ArchivePath::new("project/README.md").unwrap(), b"# Project")
        .unwrap();
    writer
        .add_bytes(
            ArchivePath::new("project/src/main.rs").unwrap(),
            &common::text_bytes(30_000),
        )
        .unwrap();
    writer
        .add_bytes(ArchivePath::new("other/notes.txt").unwrap(), b"notes")
        .unwrap();
    let (_, cursor) = writer.finish_into_inner().unwrap();
    cursor.into_inner()
}

#[test]
fn test_extract_everything() {
    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open(Cursor::new(project_archive())).unwrap();
    let result = archive
        .extract_to_dir(dest.path(), (), ExtractOptions::default())
        .unwrap();
    assert_eq!(result.entries_extracted, 3);
    assert_eq!(result.directories_created, 1);
    assert_eq!(result.bytes_extracted, 9 + 30_000 + 5);
    assert!(dest.path().join("project").is_dir());
    assert_eq!(
        std::fs::read(dest.path().join("project/src/main.rs")).unwrap(),
        common::text_bytes(30_000)
    );
}

#[test]
fn test_selectors() {
    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open(Cursor::new(project_archive())).unwrap();

    let by_prefix = archive
        .extract_to_dir(
            dest.path().join("a"),
            SelectByPrefix::new("project"),
            ExtractOptions::default(),
        )
        .unwrap();
    assert_eq!(by_prefix.entries_extracted, 2);
    assert!(!dest.path().join("a/other").exists());

    let by_name = archive
        .extract_to_dir(
            dest.path().join("b"),
            SelectByName::new(["other/notes.txt"]),
            ExtractOptions::default(),
        )
        .unwrap();
    assert_eq!(by_name.entries_extracted, 1);
    assert!(dest.path().join("b/other/notes.txt").is_file());

    let files_only = archive
        .extract_to_dir(dest.path().join("c"), SelectFilesOnly, ExtractOptions::default())
        .unwrap();
    assert_eq!(files_only.directories_created, 0);
    assert_eq!(files_only.entries_extracted, 3);

    let by_closure = archive
        .extract_to_dir(
            dest.path().join("d"),
            |e: &zipforge::ArchiveEntry| e.uncompressed_size > 1000,
            ExtractOptions::default(),
        )
        .unwrap();
    assert_eq!(by_closure.entries_extracted, 1);
}

#[test]
fn test_overwrite_policies() {
    let dest = tempfile::tempdir().unwrap();
    let existing = dest.path().join("other/notes.txt");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"local edits").unwrap();

    let mut archive = Archive::open(Cursor::new(project_archive())).unwrap();
    let only_notes = || SelectByName::new(["other/notes.txt"]);

    let err = archive
        .extract_to_dir(dest.path(), only_notes(), ExtractOptions::default())
        .unwrap_err();
    assert!(matches!(err, zipforge::Error::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    assert_eq!(std::fs::read(&existing).unwrap(), b"local edits");

    let skipped = archive
        .extract_to_dir(
            dest.path(),
            only_notes(),
            ExtractOptions::new().overwrite(OverwritePolicy::Skip),
        )
        .unwrap();
    assert_eq!(skipped.entries_skipped, 1);
    assert_eq!(std::fs::read(&existing).unwrap(), b"local edits");

    let replaced = archive
        .extract_to_dir(
            dest.path(),
            only_notes(),
            ExtractOptions::new().overwrite(OverwritePolicy::Overwrite),
        )
        .unwrap();
    assert_eq!(replaced.entries_extracted, 1);
    assert_eq!(std::fs::read(&existing).unwrap(), b"notes");
}

#[test]
fn test_preserve_mtime() {
    let modified = Timestamp::from_unix_secs(1_600_000_000).unwrap();
    let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
    writer
        .add_bytes_with(
            ArchivePath::new("dated.txt").unwrap(),
            b"dated",
            EntryOptions::new().modified(modified),
        )
        .unwrap();
    let (_, cursor) = writer.finish_into_inner().unwrap();

    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open(Cursor::new(cursor.into_inner())).unwrap();
    assert_eq!(
        archive.entry("dated.txt").unwrap().modified().map(|t| t.as_unix_secs()),
        Some(1_600_000_000)
    );
    archive
        .extract_to_dir(dest.path(), (), ExtractOptions::new().preserve_mtime(true))
        .unwrap();
    let meta = std::fs::metadata(dest.path().join("dated.txt")).unwrap();
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    assert_eq!(mtime.unix_seconds(), 1_600_000_000);
}

#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl ProgressReporter for Events {
    fn on_entry_start(&mut self, name: &str, size: u64) {
        self.0.lock().unwrap().push(format!("start {name} {size}"));
    }

    fn on_entry_complete(&mut self, name: &str, success: bool) {
        self.0.lock().unwrap().push(format!("done {name} {success}"));
    }
}

#[test]
fn test_extraction_progress() {
    let events = Events::default();
    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open(Cursor::new(project_archive())).unwrap();
    archive
        .extract_to_dir(
            dest.path(),
            SelectByPrefix::new("project"),
            ExtractOptions::new().progress(events.clone()),
        )
        .unwrap();
    assert_eq!(
        *events.0.lock().unwrap(),
        [
            "start project/README.md 9",
            "done project/README.md true",
            "start project/src/main.rs 30000",
            "done project/src/main.rs true",
        ]
    );
}

#[test]
fn test_cancelled_extraction_leaves_no_partial_file() {
    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open(Cursor::new(project_archive())).unwrap();
    let err = archive
        .extract_to_dir(
            dest.path(),
            SelectByName::new(["project/src/main.rs"]),
            ExtractOptions::new().progress(progress_fn(|done, _| done == 0)),
        )
        .unwrap_err();
    assert!(matches!(err, zipforge::Error::Io(ref e) if e.kind() == std::io::ErrorKind::Interrupted));
    assert!(!dest.path().join("project/src/main.rs").exists());
}
