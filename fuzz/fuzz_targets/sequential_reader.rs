//! Fuzz target for SequentialReader with arbitrary byte input.
//!
//! The sequential reader trusts local headers only, so it walks data
//! descriptors, buffered entries and encryption headers without the
//! central directory to check against.
//!
//! Run with: cargo +nightly fuzz run sequential_reader

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use zipforge::{ReadLimits, ReadOptions, SequentialReader};

fuzz_target!(|data: &[u8]| {
    let limits = ReadLimits::default()
        .max_entries(256)
        .max_entry_size(1 << 20)
        .max_buffered_entry(1 << 20);
    let options = ReadOptions::new().limits(limits).password("fuzz");

    let mut reader = SequentialReader::with_options(Cursor::new(data), options);
    loop {
        match reader.next_entry() {
            Ok(Some(entry)) => {
                let _ = entry.read_to_vec();
            }
            Ok(None) | Err(_) => break,
        }
    }
});
