//! Fuzz target for ArchivePath::new with arbitrary string input.
//!
//! Checks that every accepted name is a safe relative path:
//! - no `..` or `.` segment
//! - not absolute
//! - no NUL byte, no backslash
//!
//! Run with: cargo +nightly fuzz run archive_path

#![no_main]

use libfuzzer_sys::fuzz_target;
use zipforge::ArchivePath;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = ArchivePath::new(name) else {
        return;
    };
    let normalized = path.as_str();

    assert!(
        !normalized.split('/').any(|seg| seg == ".." || seg == "."),
        "traversal segment accepted: {:?}",
        normalized
    );
    assert!(!normalized.starts_with('/'), "absolute path accepted: {:?}", normalized);
    assert!(!normalized.contains('\0'), "NUL byte accepted: {:?}", normalized);
    assert!(!normalized.contains('\\'), "backslash survived: {:?}", normalized);

    // Normalization is idempotent.
    let again = ArchivePath::new(normalized).expect("normalized name must parse");
    assert_eq!(again.as_str(), normalized);
});
