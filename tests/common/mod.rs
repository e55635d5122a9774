//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::Cursor;

use rand::{Rng, SeedableRng, rngs::StdRng};
use zipforge::{Archive, ArchivePath, EntryOptions, WriteOptions, WriteResult, Writer};

/// Creates an in-memory archive over a seekable sink.
///
/// Returns both the archive bytes and the [`WriteResult`].
pub fn create_archive_with_result(
    options: Option<WriteOptions>,
    entries: &[(&str, &[u8])],
) -> zipforge::Result<(Vec<u8>, WriteResult)> {
    let writer = Writer::create(Cursor::new(Vec::new()))?;
    let mut writer = match options {
        Some(opts) => writer.options(opts),
        None => writer,
    };
    for (name, data) in entries {
        writer.add_bytes(ArchivePath::new(name)?, data)?;
    }
    let (result, cursor) = writer.finish_into_inner()?;
    Ok((cursor.into_inner(), result))
}

/// Creates an in-memory archive with default options.
pub fn create_archive(entries: &[(&str, &[u8])]) -> zipforge::Result<Vec<u8>> {
    create_archive_with_result(None, entries).map(|(bytes, _)| bytes)
}

/// Creates an in-memory archive with custom options.
pub fn create_archive_with_options(
    options: WriteOptions,
    entries: &[(&str, &[u8])],
) -> zipforge::Result<Vec<u8>> {
    create_archive_with_result(Some(options), entries).map(|(bytes, _)| bytes)
}

/// Creates an archive over a forward-only sink, streaming each entry in
/// `chunk`-sized writes so that sizes are unknown up front.
pub fn create_streamed_archive(
    options: WriteOptions,
    entries: &[(&str, &[u8])],
    chunk: usize,
) -> zipforge::Result<Vec<u8>> {
    let mut writer = Writer::create_streaming(Vec::new())?.options(options);
    for (name, data) in entries {
        let mut source = Cursor::new(*data);
        let mut limited = ChunkedReader::new(&mut source, chunk);
        writer.add_stream(ArchivePath::new(name)?, &mut limited, EntryOptions::new())?;
    }
    let (_, bytes) = writer.finish_into_inner()?;
    Ok(bytes)
}

/// A reader that never returns more than `chunk` bytes per call.
pub struct ChunkedReader<'a, R> {
    inner: &'a mut R,
    chunk: usize,
}

impl<'a, R> ChunkedReader<'a, R> {
    pub fn new(inner: &'a mut R, chunk: usize) -> Self {
        Self {
            inner,
            chunk: chunk.max(1),
        }
    }
}

impl<R: std::io::Read> std::io::Read for ChunkedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..n])
    }
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Compressible text-like bytes.
pub fn text_bytes(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Extracts the error from a Result, panicking if it's Ok.
pub fn expect_err<T, E>(result: Result<T, E>) -> E {
    match result {
        Ok(_) => panic!("Expected error but got Ok"),
        Err(e) => e,
    }
}

/// Returns the entry names of an archive in directory order.
pub fn entry_names(archive_bytes: &[u8]) -> Vec<String> {
    let archive = Archive::open(Cursor::new(archive_bytes)).expect("Failed to open archive");
    archive.entries().map(|e| e.name.clone()).collect()
}

/// Verifies archive integrity and content by opening, testing, and reading.
///
/// # Panics
///
/// Panics if the archive cannot be opened, any entry fails its check, the
/// file count differs, or content differs from `expected_entries`.
pub fn verify_archive_contents(archive_bytes: &[u8], expected_entries: &[(&str, &[u8])]) {
    verify_with(Archive::open(Cursor::new(archive_bytes)), expected_entries);
}

/// Like [`verify_archive_contents`], opening the archive with a password.
pub fn verify_encrypted_archive(
    archive_bytes: &[u8],
    password: &str,
    expected_entries: &[(&str, &[u8])],
) {
    verify_with(
        Archive::open_with_password(Cursor::new(archive_bytes), password),
        expected_entries,
    );
}

fn verify_with(
    archive: zipforge::Result<Archive<Cursor<&[u8]>>>,
    expected_entries: &[(&str, &[u8])],
) {
    let mut archive = archive.expect("Failed to open archive for verification");

    let test_result = archive.test().expect("Archive test failed");
    assert!(
        test_result.is_ok(),
        "integrity check failed: {:?}",
        test_result.failures
    );

    let file_count = archive.entries().filter(|e| e.is_file()).count();
    assert_eq!(
        file_count,
        expected_entries.len(),
        "Entry count mismatch: expected {}, got {}",
        expected_entries.len(),
        file_count
    );

    for (name, expected_data) in expected_entries {
        let extracted = archive
            .read_entry(name)
            .unwrap_or_else(|e| panic!("Failed to read '{}': {}", name, e));
        assert_eq!(&extracted[..], *expected_data, "Content mismatch for '{}'", name);
    }
}
