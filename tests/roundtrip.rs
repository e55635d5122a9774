//! Round-trip integration tests.
//!
//! Every combination of compression method and encryption is written over
//! both kinds of sink and read back through the seekable reader, plus a few
//! layout scenarios: empty archives, directories, comments and Unicode names.

mod common;

use std::io::Cursor;

use zipforge::crypto::{AesStrength, AesVendorVersion};
use zipforge::{
    Archive, ArchivePath, CompressionMethod, EncryptionMethod, EntryOptions, WriteOptions, Writer,
};

const PASSWORD: &str = "correct horse battery staple";

fn matrix() -> Vec<(CompressionMethod, EncryptionMethod)> {
    let methods = [CompressionMethod::Stored, CompressionMethod::Deflate];
    let encryptions = [
        EncryptionMethod::None,
        EncryptionMethod::ZipCrypto,
        EncryptionMethod::Aes(AesStrength::Aes128),
        EncryptionMethod::Aes(AesStrength::Aes256),
    ];
    methods
        .iter()
        .flat_map(|m| encryptions.iter().map(move |e| (*m, *e)))
        .collect()
}

fn options_for(method: CompressionMethod, encryption: EncryptionMethod) -> WriteOptions {
    let options = WriteOptions::new().method(method);
    if encryption == EncryptionMethod::None {
        options
    } else {
        options
            .encryption(encryption)
            .expect("writable encryption")
            .password(PASSWORD)
    }
}

fn sample_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("empty.txt", Vec::new()),
        ("text.txt", common::text_bytes(20_000)),
        ("random.bin", common::random_bytes(5000, 7)),
        ("nested/dir/one.byte", vec![0x42]),
    ]
}

fn as_refs<'a>(entries: &'a [(&'static str, Vec<u8>)]) -> Vec<(&'static str, &'a [u8])> {
    entries.iter().map(|(n, d)| (*n, d.as_slice())).collect()
}

fn verify(bytes: &[u8], encryption: EncryptionMethod, entries: &[(&str, &[u8])]) {
    if encryption == EncryptionMethod::None {
        common::verify_archive_contents(bytes, entries);
    } else {
        common::verify_encrypted_archive(bytes, PASSWORD, entries);
    }
}

#[test]
fn test_matrix_seekable_sink() {
    let entries = sample_entries();
    let refs = as_refs(&entries);
    for (method, encryption) in matrix() {
        let bytes = common::create_archive_with_options(options_for(method, encryption), &refs)
            .unwrap_or_else(|e| panic!("{method:?}/{encryption:?}: {e}"));
        verify(&bytes, encryption, &refs);

        let archive = Archive::open(Cursor::new(&bytes)).unwrap();
        for entry in archive.entries() {
            assert_eq!(entry.is_encrypted(), encryption != EncryptionMethod::None);
        }
    }
}

#[test]
fn test_matrix_forward_only_sink() {
    let entries = sample_entries();
    let refs = as_refs(&entries);
    for (method, encryption) in matrix() {
        let bytes = common::create_streamed_archive(options_for(method, encryption), &refs, 777)
            .unwrap_or_else(|e| panic!("{method:?}/{encryption:?}: {e}"));
        verify(&bytes, encryption, &refs);
    }
}

#[test]
fn test_sink_equivalence() {
    let entries = sample_entries();
    let refs = as_refs(&entries);
    for (method, encryption) in matrix() {
        let options = options_for(method, encryption);
        let seekable = common::create_archive_with_options(options.clone(), &refs).unwrap();
        let streamed = common::create_streamed_archive(options, &refs, 4096).unwrap();

        let mut a = Archive::open_with_password(Cursor::new(seekable), PASSWORD).unwrap();
        let mut b = Archive::open_with_password(Cursor::new(streamed), PASSWORD).unwrap();
        let names_a: Vec<String> = a.entries().map(|e| e.name.clone()).collect();
        let names_b: Vec<String> = b.entries().map(|e| e.name.clone()).collect();
        assert_eq!(names_a, names_b);
        for name in &names_a {
            let ea = a.entry(name).unwrap();
            let eb = b.entry(name).unwrap();
            assert_eq!(ea.uncompressed_size, eb.uncompressed_size, "{name}");
            assert_eq!(ea.method_id, eb.method_id, "{name}");
            assert_eq!(a.read_entry(name).unwrap(), b.read_entry(name).unwrap());
        }
    }
}

#[test]
fn test_empty_archive() {
    let (bytes, result) = common::create_archive_with_result(None, &[]).unwrap();
    assert_eq!(result.entries_written, 0);
    assert_eq!(result.directories_written, 0);
    assert!(!result.zip64);
    // A bare end record.
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[..4], b"PK\x05\x06");

    let archive = Archive::open(Cursor::new(bytes)).unwrap();
    assert!(archive.is_empty());
}

#[test]
fn test_local_header_signature() {
    let bytes = common::create_archive(&[("a.txt", b"abc")]).unwrap();
    assert_eq!(&bytes[..4], b"PK\x03\x04");
}

#[test]
fn test_deep_directory_structure() {
    let entries = [("a/b/c/d/e/f/g/deep.txt", b"Deeply nested file".as_slice())];
    let (bytes, result) = common::create_archive_with_result(None, &entries).unwrap();
    assert_eq!(result.entries_written, 1);
    common::verify_archive_contents(&bytes, &entries);
}

#[test]
fn test_directory_entries() {
    let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
    writer
        .add_directory(ArchivePath::new("docs").unwrap(), Default::default())
        .unwrap();
    writer
        .add_bytes(ArchivePath::new("docs/readme.txt").unwrap(), b"read me")
        .unwrap();
    let (result, cursor) = writer.finish_into_inner().unwrap();
    assert_eq!(result.entries_written, 1);
    assert_eq!(result.directories_written, 1);

    let mut archive = Archive::open(Cursor::new(cursor.into_inner())).unwrap();
    let dir = archive.entry("docs/").unwrap();
    assert!(dir.is_dir());
    assert_eq!(dir.uncompressed_size, 0);
    assert_eq!(archive.read_entry("docs/readme.txt").unwrap(), b"read me");
}

#[test]
fn test_unicode_names() {
    let entries = [
        ("日本語/ファイル.txt", b"japanese".as_slice()),
        ("Ελληνικά.txt", b"greek".as_slice()),
        ("emoji-🦀.txt", b"crab".as_slice()),
        ("plain.txt", b"ascii".as_slice()),
    ];
    let bytes = common::create_archive(&entries).unwrap();
    common::verify_archive_contents(&bytes, &entries);

    let archive = Archive::open(Cursor::new(&bytes)).unwrap();
    const UTF8_FLAG: u16 = 1 << 11;
    for entry in archive.entries() {
        let non_ascii = !entry.name.is_ascii();
        assert_eq!(entry.flags & UTF8_FLAG != 0, non_ascii, "{}", entry.name);
    }
}

#[test]
fn test_archive_and_entry_comments() {
    let mut writer = Writer::create(Cursor::new(Vec::new()))
        .unwrap()
        .options(WriteOptions::new().comment("release 1.2"));
    writer
        .add_bytes_with(
            ArchivePath::new("notes.txt").unwrap(),
            b"notes",
            EntryOptions::new().comment("see changelog"),
        )
        .unwrap();
    let (_, cursor) = writer.finish_into_inner().unwrap();

    let archive = Archive::open(Cursor::new(cursor.into_inner())).unwrap();
    assert_eq!(archive.comment(), Some("release 1.2"));
    assert_eq!(archive.entry("notes.txt").unwrap().comment, "see changelog");
}

#[test]
fn test_ae2_stores_zero_crc() {
    let options = WriteOptions::new()
        .aes(AesStrength::Aes256)
        .aes_version(AesVendorVersion::Ae2)
        .password(PASSWORD);
    let data = common::text_bytes(3000);
    let bytes = common::create_archive_with_options(options, &[("doc.txt", &data)]).unwrap();

    let mut archive = Archive::open_with_password(Cursor::new(bytes), PASSWORD).unwrap();
    let entry = archive.entry("doc.txt").unwrap();
    assert_eq!(entry.crc32, 0);
    assert_eq!(entry.aes_version, Some(AesVendorVersion::Ae2));
    assert_eq!(archive.read_entry("doc.txt").unwrap(), data);
}

#[test]
fn test_per_entry_overrides() {
    let mut writer = Writer::create(Cursor::new(Vec::new()))
        .unwrap()
        .options(WriteOptions::new().aes(AesStrength::Aes128).password(PASSWORD));
    writer
        .add_bytes(ArchivePath::new("secret.txt").unwrap(), b"secret")
        .unwrap();
    writer
        .add_bytes_with(
            ArchivePath::new("public.txt").unwrap(),
            b"public",
            EntryOptions::new()
                .unencrypted()
                .method(CompressionMethod::Stored),
        )
        .unwrap();
    let (_, cursor) = writer.finish_into_inner().unwrap();

    let mut archive = Archive::open(Cursor::new(cursor.into_inner())).unwrap();
    let public = archive.entry("public.txt").unwrap();
    assert!(!public.is_encrypted());
    assert_eq!(public.method_id, 0);
    assert_eq!(archive.read_entry("public.txt").unwrap(), b"public");
    assert!(archive.read_entry("secret.txt").unwrap_err().is_encryption_error());
}

#[test]
fn test_write_result_totals() {
    let text = common::text_bytes(50_000);
    let (bytes, result) =
        common::create_archive_with_result(None, &[("a.txt", &text), ("b.txt", b"tiny")]).unwrap();
    assert_eq!(result.entries_written, 2);
    assert_eq!(result.total_size, 50_004);
    assert!(result.compressed_size < result.total_size);
    assert_eq!(result.archive_size, bytes.len() as u64);
    assert!(result.space_savings() > 0.5);
}

#[test]
fn test_archive_after_prefix() {
    // An archive written after a stub (as self-extractors do) still opens.
    let mut cursor = Cursor::new(b"#!/bin/stub\n".to_vec());
    cursor.set_position(12);
    let mut writer = Writer::create(cursor).unwrap();
    writer
        .add_bytes(ArchivePath::new("payload.txt").unwrap(), b"payload")
        .unwrap();
    let (_, cursor) = writer.finish_into_inner().unwrap();

    let mut archive = Archive::open(Cursor::new(cursor.into_inner())).unwrap();
    assert_eq!(archive.read_entry("payload.txt").unwrap(), b"payload");
}
