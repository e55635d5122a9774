//! Fuzz target for Archive::open with arbitrary byte input.
//!
//! Exercises end-of-central-directory discovery, Zip64 records, central
//! directory parsing and, for whatever opens, local header validation and
//! decoding under tight resource limits.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use zipforge::{Archive, ReadLimits, ReadOptions};

fuzz_target!(|data: &[u8]| {
    let limits = ReadLimits::default()
        .max_entries(1024)
        .max_entry_size(1 << 20)
        .max_total_size(4 << 20);
    let options = ReadOptions::new().limits(limits).password("fuzz");

    let Ok(mut archive) = Archive::open_with_options(Cursor::new(data), options) else {
        return;
    };
    let _ = archive.info().is_zip64;
    let _ = archive.comment();

    let names: Vec<String> = archive.entries().map(|e| e.name.clone()).collect();
    for name in &names {
        if let Some(entry) = archive.entry(name) {
            let _ = entry.modified();
            let _ = entry.compression();
            let _ = entry.aes_strength();
        }
        let _ = archive.read_entry(name);
    }
});
