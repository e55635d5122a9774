//! Monitor extraction and save progress using callbacks.
//!
//! This example demonstrates:
//! - Implementing the `ProgressReporter` trait
//! - Reporting progress while extracting an archive
//! - Reporting progress while saving an edited archive
//!
//! # Usage
//!
//! ```bash
//! cargo run --example progress_callback -- archive.zip ./output
//! ```

use std::env;
use std::io::Write;
use std::time::Instant;
use zipforge::progress::ProgressReporter;
use zipforge::{Archive, ExtractOptions, Result, ZipFile};

/// Draws a one-line progress bar for the current entry.
struct ProgressBar {
    current: String,
    entries_done: usize,
    started: Instant,
}

impl ProgressBar {
    fn new() -> Self {
        Self {
            current: String::new(),
            entries_done: 0,
            started: Instant::now(),
        }
    }
}

impl ProgressReporter for ProgressBar {
    fn on_save_start(&mut self, entries: usize) {
        println!("Saving {} entries...", entries);
    }

    fn on_entry_start(&mut self, entry_name: &str, _size: u64) {
        self.current = entry_name.to_string();
    }

    fn on_progress(&mut self, bytes_processed: u64, total_bytes: u64) -> bool {
        const WIDTH: u64 = 30;
        let filled = if total_bytes == 0 {
            WIDTH
        } else {
            (bytes_processed.min(total_bytes) * WIDTH) / total_bytes
        };
        let bar: String = (0..WIDTH)
            .map(|i| if i < filled { '#' } else { '-' })
            .collect();
        print!("\r  [{}] {:>10} bytes  {}", bar, bytes_processed, self.current);
        let _ = std::io::stdout().flush();
        true
    }

    fn on_entry_complete(&mut self, entry_name: &str, success: bool) {
        self.entries_done += 1;
        let status = if success { "ok" } else { "FAILED" };
        println!("\r  {:<60} {}", entry_name, status);
    }

    fn on_warning(&mut self, message: &str) {
        eprintln!("  warning: {}", message);
    }

    fn on_save_complete(&mut self, success: bool) {
        println!(
            "Save {} after {:.2?}",
            if success { "finished" } else { "failed" },
            self.started.elapsed()
        );
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <archive.zip> <output_dir>", args[0]);
        std::process::exit(1);
    }

    let archive_path = &args[1];
    let output_dir = &args[2];

    let mut archive = Archive::open_path(archive_path)?;
    println!("Extracting {} entries to {}", archive.len(), output_dir);
    let started = Instant::now();
    let result = archive.extract_to_dir(
        output_dir,
        (),
        ExtractOptions::new().progress(ProgressBar::new()),
    )?;
    println!(
        "Extracted {} files ({} bytes) in {:.2?}",
        result.entries_extracted,
        result.bytes_extracted,
        started.elapsed()
    );
    println!();

    // Re-save the archive next to the extracted files, reporting progress.
    let copy = std::path::Path::new(output_dir).join("resaved.zip");
    let mut zip = ZipFile::open(archive_path)?;
    zip.set_progress(Box::new(ProgressBar::new()));
    let saved = zip.save_as(&copy)?;
    println!(
        "Wrote {} ({} entries, {} bytes)",
        copy.display(),
        saved.total_entries(),
        saved.archive_size
    );

    Ok(())
}
