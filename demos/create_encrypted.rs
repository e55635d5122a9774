//! Create a password-protected ZIP archive.
//!
//! Entries are encrypted with WinZip AES-256 by default. Pass `--zipcrypto`
//! to use the legacy cipher instead, for compatibility with old tools.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example create_encrypted -- output.zip secret_password file1.txt file2.txt
//! cargo run --example create_encrypted -- --zipcrypto output.zip secret_password file1.txt
//! ```

use std::env;
use zipforge::{AesStrength, Archive, ArchivePath, Result, WriteOptions, Writer};

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let legacy = if let Some(pos) = args.iter().position(|a| a == "--zipcrypto") {
        args.remove(pos);
        true
    } else {
        false
    };

    if args.len() < 4 {
        eprintln!(
            "Usage: {} [--zipcrypto] <output.zip> <password> <file1> [file2...]",
            args[0]
        );
        std::process::exit(1);
    }

    let output_path = &args[1];
    let password = args[2].as_str();
    let input_files = &args[3..];

    let options = WriteOptions::new().password(password).level(7)?;
    let options = if legacy {
        options.zipcrypto()
    } else {
        options.aes(AesStrength::Aes256)
    };

    println!("Creating encrypted archive: {}", output_path);
    println!("Cipher: {}", if legacy { "ZipCrypto" } else { "AES-256" });

    let mut writer = Writer::create_path(output_path)?.options(options);
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
        println!("  Adding: {} -> {}", file_path, archive_name);
        writer.add_path(path, ArchivePath::new(archive_name)?)?;
    }
    let result = writer.finish()?;

    println!();
    println!("Archive created successfully!");
    println!("  Entries: {}", result.entries_written);
    println!("  Original size: {} bytes", result.total_size);
    println!("  Compressed size: {} bytes", result.compressed_size);

    // Check the archive decrypts and verifies with the same password.
    let mut archive = Archive::open_path_with_password(output_path, password)?;
    let test = archive.test()?;
    println!(
        "  Verified: {} passed, {} failed",
        test.entries_passed, test.entries_failed
    );

    Ok(())
}
