//! Tests for resource limit enforcement.
//!
//! [`ReadLimits`] bounds how much work a hostile archive can cause: the
//! number of entries parsed, the decoded size of each entry and of a whole
//! extraction, and the memory the sequential reader may buffer.
//!
//! Note: LimitedReader unit tests are in src/safety.rs. This file covers
//! limits enforced through the public reading API.

mod common;

use std::io::{Cursor, Read};

use zipforge::{
    Archive, Error, ExtractOptions, ReadLimits, ReadOptions, SequentialReader, WriteOptions,
};

fn limited(limits: ReadLimits) -> ReadOptions {
    ReadOptions::new().limits(limits)
}

fn is_limit_error(error: &Error) -> bool {
    match error {
        Error::ResourceLimitExceeded(_) => true,
        Error::Io(io) => io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<Error>())
            .is_some_and(|inner| matches!(inner, Error::ResourceLimitExceeded(_))),
        _ => false,
    }
}

// =============================================================================
// Entry count
// =============================================================================

#[test]
fn test_default_limits_accept_normal_archive() {
    let bytes = common::create_archive(&[("a.txt", b"a"), ("b.txt", b"b")]).unwrap();
    let archive = Archive::open_with_options(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert_eq!(archive.len(), 2);
}

#[test]
fn test_max_entries_exact_boundary() {
    let entries: Vec<(String, Vec<u8>)> = (0..10)
        .map(|i| (format!("f{i}.txt"), vec![b'x'; i]))
        .collect();
    let refs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
    let bytes = common::create_archive(&refs).unwrap();

    let at_limit =
        Archive::open_with_options(Cursor::new(&bytes), limited(ReadLimits::default().max_entries(10)));
    assert_eq!(at_limit.unwrap().len(), 10);

    let err = Archive::open_with_options(
        Cursor::new(&bytes),
        limited(ReadLimits::default().max_entries(9)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err}");
}

#[test]
fn test_max_entries_in_sequential_reader() {
    let bytes = common::create_archive(&[("a", b"1"), ("b", b"2"), ("c", b"3")]).unwrap();
    let mut reader = SequentialReader::with_options(
        Cursor::new(bytes),
        limited(ReadLimits::default().max_entries(2)),
    );
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_some());
    let err = reader.next_entry().map(|_| ()).unwrap_err();
    assert!(is_limit_error(&err), "{err}");
}

// =============================================================================
// Decoded size
// =============================================================================

#[test]
fn test_max_entry_size_rejects_declared_size() {
    let data = common::text_bytes(100_000);
    let bytes = common::create_archive(&[("big.txt", &data), ("small.txt", b"ok")]).unwrap();
    let mut archive = Archive::open_with_options(
        Cursor::new(bytes),
        limited(ReadLimits::default().max_entry_size(10_000)),
    )
    .unwrap();
    let err = archive.read_entry("big.txt").unwrap_err();
    assert!(is_limit_error(&err), "{err}");
    assert_eq!(archive.read_entry("small.txt").unwrap(), b"ok");
}

#[test]
fn test_understated_size_is_caught_while_decoding() {
    // A header that claims less than the stream decodes to must not let the
    // decoder run on.
    let data = common::text_bytes(50_000);
    let mut bytes = common::create_archive(&[("bomb.txt", &data)]).unwrap();
    let central = bytes.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
    bytes[central + 24..central + 28].copy_from_slice(&100u32.to_le_bytes());
    bytes[22..26].copy_from_slice(&100u32.to_le_bytes());

    let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entry("bomb.txt").unwrap().uncompressed_size, 100);
    let mut reader = archive.entry_reader("bomb.txt").unwrap();
    let mut out = Vec::new();
    assert!(reader.read_to_end(&mut out).is_err());
    assert!(out.len() <= 100 + 64 * 1024);
}

#[test]
fn test_max_total_size_during_extraction() {
    let chunk = common::text_bytes(40_000);
    let bytes = common::create_archive(&[("a.txt", &chunk), ("b.txt", &chunk), ("c.txt", &chunk)])
        .unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut archive = Archive::open_with_options(
        Cursor::new(bytes),
        limited(ReadLimits::default().max_total_size(100_000)),
    )
    .unwrap();
    let err = archive
        .extract_to_dir(dest.path(), (), ExtractOptions::default())
        .unwrap_err();
    assert!(is_limit_error(&err), "{err}");
    // The entry that crossed the budget left no partial file behind.
    assert!(!dest.path().join("c.txt").exists());
}

#[test]
fn test_max_ratio() {
    let data = vec![0u8; 200_000];
    let bytes = common::create_archive(&[("zeros.bin", &data)]).unwrap();
    let mut archive = Archive::open_with_options(
        Cursor::new(&bytes),
        limited(ReadLimits::default().max_ratio(50)),
    )
    .unwrap();
    let err = archive.read_entry("zeros.bin").unwrap_err();
    assert!(is_limit_error(&err), "{err}");

    // Without a ratio limit the same entry is fine.
    let mut archive = Archive::open(Cursor::new(&bytes)).unwrap();
    assert_eq!(archive.read_entry("zeros.bin").unwrap().len(), 200_000);
}

#[test]
fn test_unlimited() {
    let data = vec![0u8; 100_000];
    let bytes = common::create_archive(&[("zeros.bin", &data)]).unwrap();
    let mut archive =
        Archive::open_with_options(Cursor::new(bytes), limited(ReadLimits::unlimited())).unwrap();
    assert_eq!(archive.read_entry("zeros.bin").unwrap(), data);
}

// =============================================================================
// Sequential buffering
// =============================================================================

#[test]
fn test_max_buffered_entry_for_descriptor_entries() {
    let data = common::random_bytes(50_000, 11);
    let bytes =
        common::create_streamed_archive(WriteOptions::new(), &[("stream.bin", &data)], 4096).unwrap();

    let mut reader = SequentialReader::with_options(
        Cursor::new(&bytes),
        limited(ReadLimits::default().max_buffered_entry(10_000)),
    );
    let err = reader.next_entry().map(|_| ()).unwrap_err();
    assert!(is_limit_error(&err), "{err}");

    let mut reader = SequentialReader::new(Cursor::new(&bytes));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.read_to_vec().unwrap(), data);
}
