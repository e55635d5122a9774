//! Create a ZIP archive from files.
//!
//! This example demonstrates basic archive creation:
//! - Creating an archive from files on disk
//! - Adding data from memory
//! - Configuring compression options
//! - Getting compression statistics
//!
//! # Usage
//!
//! ```bash
//! cargo run --example create_archive -- output.zip file1.txt file2.txt
//! ```

use std::env;
use zipforge::{ArchivePath, CompressionMethod, Result, WriteOptions, Writer, Zip64Policy};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <output.zip> [file1] [file2...]", args[0]);
        eprintln!();
        eprintln!("Creates a ZIP archive from the specified files.");
        eprintln!("If no files are specified, creates a demo archive with sample data.");
        std::process::exit(1);
    }

    let output_path = &args[1];
    let input_files = &args[2..];

    let options = WriteOptions::new()
        .method(CompressionMethod::Deflate)
        .level(6)?
        .zip64(Zip64Policy::AsNecessary)
        .comment("created by the zipforge create_archive example");

    println!("Creating archive: {}", output_path);
    println!("Compression: Deflate level 6");
    println!();

    let mut writer = Writer::create_path(output_path)?.options(options);

    if input_files.is_empty() {
        println!("No files specified, creating demo archive...");
        println!();

        let readme = b"Welcome to zipforge!\n\nThis is a demo archive.";
        writer.add_bytes(ArchivePath::new("readme.txt")?, readme)?;
        println!("  Added: readme.txt ({} bytes)", readme.len());

        writer.add_directory(ArchivePath::directory("data")?, Default::default())?;
        println!("  Added: data/");

        let zeros = vec![0u8; 1000];
        writer.add_bytes(ArchivePath::new("data/zeros.bin")?, &zeros)?;
        println!("  Added: data/zeros.bin ({} bytes)", zeros.len());

        let pattern: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        writer.add_bytes(ArchivePath::new("data/pattern.bin")?, &pattern)?;
        println!("  Added: data/pattern.bin ({} bytes)", pattern.len());
    } else {
        for file_path in input_files {
            let path = std::path::Path::new(file_path);
            if !path.is_file() {
                eprintln!("Warning: not a file, skipping: {}", file_path);
                continue;
            }
            let archive_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(file_path);
            let entry = writer.add_path(path, ArchivePath::new(archive_name)?)?;
            println!(
                "  Added: {} ({} -> {} bytes)",
                entry.name, entry.uncompressed_size, entry.compressed_size
            );
        }
    }

    let result = writer.finish()?;

    println!();
    println!("Archive created successfully!");
    println!("  Files written: {}", result.entries_written);
    println!("  Directories: {}", result.directories_written);
    println!("  Original size: {} bytes", result.total_size);
    println!("  Compressed size: {} bytes", result.compressed_size);
    println!("  Archive size: {} bytes", result.archive_size);
    println!("  Zip64: {}", result.zip64);
    if result.total_size > 0 {
        println!("  Space saved: {:.1}%", result.space_savings() * 100.0);
    }

    Ok(())
}
