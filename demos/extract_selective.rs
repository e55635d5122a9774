//! Extract only specific files from a ZIP archive.
//!
//! This example demonstrates the selectors accepted by
//! [`Archive::extract_to_dir`]:
//! - a closure over the entry (by extension, by size)
//! - a directory prefix
//! - a list of exact names
//!
//! # Usage
//!
//! ```bash
//! cargo run --example extract_selective -- archive.zip ./output
//! ```

use std::env;
use std::path::Path;
use zipforge::read::{OverwritePolicy, SelectByName, SelectByPrefix};
use zipforge::{Archive, ArchiveEntry, ExtractOptions, Result};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <archive.zip> <output_dir> [directory]", args[0]);
        std::process::exit(1);
    }

    let archive_path = &args[1];
    let output_dir = Path::new(&args[2]);

    println!("Opening archive: {}", archive_path);
    let mut archive = Archive::open_path(archive_path)?;

    println!("Archive contains {} entries:", archive.len());
    for entry in archive.entries() {
        let kind = if entry.is_dir() { "DIR " } else { "FILE" };
        let lock = if entry.is_encrypted() { " [encrypted]" } else { "" };
        println!(
            "  [{}] {} ({} bytes){}",
            kind, entry.name, entry.uncompressed_size, lock
        );
    }
    println!();

    let options = || ExtractOptions::new().overwrite(OverwritePolicy::Overwrite);

    println!("Extracting only .txt files...");
    let txt = |entry: &ArchiveEntry| entry.is_file() && entry.name.ends_with(".txt");
    let target = output_dir.join("txt_only");
    let result = archive.extract_to_dir(&target, txt, options())?;
    println!("  Extracted {} files to {}", result.entries_extracted, target.display());

    println!("Extracting files larger than 100 bytes...");
    let large = |entry: &ArchiveEntry| entry.is_file() && entry.uncompressed_size > 100;
    let target = output_dir.join("large_files");
    let result = archive.extract_to_dir(&target, large, options())?;
    println!("  Extracted {} files to {}", result.entries_extracted, target.display());

    if let Some(directory) = args.get(3) {
        println!("Extracting everything under {}/...", directory);
        let target = output_dir.join("subtree");
        let result = archive.extract_to_dir(&target, SelectByPrefix::new(directory.as_str()), options())?;
        println!(
            "  Extracted {} files and {} directories to {}",
            result.entries_extracted,
            result.directories_created,
            target.display()
        );
    }

    println!("Extracting specific files by name...");
    let names = SelectByName::new(["readme.txt", "config.json"]);
    let target = output_dir.join("specific");
    let result = archive.extract_to_dir(&target, names, options())?;
    println!("  Extracted {} files to {}", result.entries_extracted, target.display());

    println!();
    println!("Selective extraction complete!");
    Ok(())
}
