//! Zip64 policy tests.
//!
//! The entry-count field of the classic end record is 16 bits wide with
//! 0xFFFF reserved as the Zip64 marker, so 65534 entries is the largest
//! archive that needs no Zip64 structures.

mod common;

use std::io::Cursor;

use zipforge::format::Zip64Policy;
use zipforge::{
    Archive, ArchivePath, CompressionMethod, Error, SequentialReader, WriteOptions, Writer,
};

const EOCD64_SIGNATURE: &[u8] = b"PK\x06\x06";
const EOCD64_LOCATOR_SIGNATURE: &[u8] = b"PK\x06\x07";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn write_empty_entries(count: usize, policy: Zip64Policy) -> zipforge::Result<Vec<u8>> {
    let options = WriteOptions::new()
        .method(CompressionMethod::Stored)
        .zip64(policy);
    let mut writer = Writer::create(Cursor::new(Vec::new()))?.options(options);
    for i in 0..count {
        writer.add_bytes(ArchivePath::new(&format!("{i:05}"))?, b"")?;
    }
    let (result, cursor) = writer.finish_into_inner()?;
    assert_eq!(result.entries_written, count);
    Ok(cursor.into_inner())
}

#[test]
fn test_max_narrow_entry_count_needs_no_zip64() {
    let bytes = write_empty_entries(65534, Zip64Policy::AsNecessary).unwrap();
    assert!(!contains(&bytes[bytes.len().saturating_sub(200)..], EOCD64_SIGNATURE));

    let archive = Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 65534);
    assert!(!archive.info().is_zip64);
}

#[test]
fn test_entry_count_overflow_emits_zip64() {
    let bytes = write_empty_entries(65535, Zip64Policy::AsNecessary).unwrap();
    let tail = &bytes[bytes.len() - 200..];
    assert!(contains(tail, EOCD64_SIGNATURE));
    assert!(contains(tail, EOCD64_LOCATOR_SIGNATURE));

    let archive = Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 65535);
    assert!(archive.info().is_zip64);
}

#[test]
fn test_never_policy_refuses_overflowing_count() {
    let err = common::expect_err(write_empty_entries(65535, Zip64Policy::Never));
    assert!(
        matches!(err, Error::Zip64Required { field: "entry count", value: 65535 }),
        "unexpected error: {err}"
    );
}

#[test]
fn test_never_policy_writes_small_archives() {
    let options = WriteOptions::new().zip64(Zip64Policy::Never);
    let entries = [("a.txt", b"alpha".as_slice())];
    let (bytes, result) = common::create_archive_with_result(Some(options), &entries).unwrap();
    assert!(!result.zip64);
    assert!(!contains(&bytes, EOCD64_SIGNATURE));
    common::verify_archive_contents(&bytes, &entries);
}

#[test]
fn test_always_policy_single_entry() {
    let data = common::text_bytes(10_000);
    let options = WriteOptions::new().zip64(Zip64Policy::Always);
    let (bytes, result) =
        common::create_archive_with_result(Some(options), &[("a.txt", &data)]).unwrap();
    assert!(result.zip64);
    assert!(contains(&bytes, EOCD64_SIGNATURE));
    assert!(contains(&bytes, EOCD64_LOCATOR_SIGNATURE));

    let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
    assert!(archive.info().is_zip64);
    let entry = archive.entry("a.txt").unwrap();
    assert!(entry.zip64);
    assert_eq!(entry.uncompressed_size, 10_000);
    assert_eq!(archive.read_entry("a.txt").unwrap(), data);
}

#[test]
fn test_always_policy_forward_only_sink() {
    let data = common::random_bytes(70_000, 3);
    let options = WriteOptions::new().zip64(Zip64Policy::Always);
    let entries = [("blob.bin", data.as_slice()), ("empty", b"".as_slice())];
    let bytes = common::create_streamed_archive(options, &entries, 1000).unwrap();
    common::verify_archive_contents(&bytes, &entries);

    // Wide descriptors must also be readable without the central directory.
    let mut reader = SequentialReader::new(Cursor::new(bytes));
    let mut seen = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        let name = entry.entry().name.clone();
        seen.push((name, entry.read_to_vec().unwrap()));
    }
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, data);
    assert!(seen[1].1.is_empty());
}

#[test]
fn test_zip64_policy_default() {
    assert_eq!(Zip64Policy::default(), Zip64Policy::AsNecessary);
    assert_eq!(WriteOptions::new().zip64, Zip64Policy::AsNecessary);
}
