//! Entry extraction and integrity testing.
//!
//! Files extracted to disk are written to a temporary file next to the
//! target and renamed into place only after the entry verified, so a
//! failing entry never leaves a truncated file behind.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use crate::directory::ArchiveEntry;
use crate::error::unwrap_io;
use crate::progress::{ProgressReporter, cancelled};
use crate::safety::{TotalBudget, validate_extract_path};
use crate::{Error, Password, READ_BUFFER_SIZE, Result};

use super::{Archive, EntrySelector, ExtractOptions, ExtractResult, OverwritePolicy, TestResult};

/// Copies a decoded entry into `out`, reporting progress.
///
/// Errors raised by the decoder are unwrapped back into crate errors;
/// errors from `out` stay I/O errors.
pub(crate) fn copy_decoded(
    reader: &mut dyn Read,
    out: &mut dyn Write,
    total: u64,
    progress: &mut Option<Box<dyn ProgressReporter>>,
) -> Result<u64> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(unwrap_io(e)),
        };
        out.write_all(&buf[..n])?;
        copied += n as u64;
        if let Some(progress) = progress.as_mut() {
            if !progress.on_progress(copied, total) {
                return Err(Error::Io(cancelled()));
            }
        }
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Reads the whole decoded content of an entry.
    ///
    /// # Errors
    ///
    /// Any error of [`entry_reader`](Self::entry_reader), plus
    /// [`Error::CrcMismatch`] if the content does not verify. Nothing is
    /// returned for an entry that fails verification.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_entry_inner(name, None)
    }

    /// Reads an entry with a password that overrides the one given at open.
    pub fn read_entry_with_password(
        &mut self,
        name: &str,
        password: impl Into<Password>,
    ) -> Result<Vec<u8>> {
        let password = password.into();
        self.read_entry_inner(name, Some(&password))
    }

    fn read_entry_inner(&mut self, name: &str, password: Option<&Password>) -> Result<Vec<u8>> {
        let mut reader = self.open_entry(name, password, None)?;
        // The recorded size is a hint only; cap the up-front allocation.
        let mut out = Vec::with_capacity(reader.size().min(16 * 1024 * 1024) as usize);
        reader.read_to_end(&mut out).map_err(unwrap_io)?;
        Ok(out)
    }

    /// Streams the decoded content of an entry into `out`.
    ///
    /// Bytes already written to `out` when verification fails must be
    /// discarded by the caller.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub fn extract_to(&mut self, name: &str, out: &mut dyn Write) -> Result<u64> {
        let mut reader = self.open_entry(name, None, None)?;
        let total = reader.size();
        copy_decoded(&mut reader, out, total, &mut None)
    }

    /// Extracts entries to a destination directory.
    ///
    /// # Arguments
    ///
    /// * `dest` - Destination directory, created if missing
    /// * `selector` - Selects which entries to extract. Pass `()` to extract
    ///   all entries, or a closure such as `|e: &ArchiveEntry| e.is_file()`.
    /// * `options` - Extraction options
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use zipforge::{Archive, ExtractOptions};
    ///
    /// let mut archive = Archive::open_path("archive.zip")?;
    /// archive.extract_to_dir("./output", (), ExtractOptions::new().preserve_mtime(true))?;
    /// # Ok::<(), zipforge::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Stops at the first entry that fails. [`Error::PathTraversal`] is
    /// returned before anything is written for a name that escapes `dest`.
    pub fn extract_to_dir(
        &mut self,
        dest: impl AsRef<Path>,
        selector: impl EntrySelector,
        options: ExtractOptions,
    ) -> Result<ExtractResult> {
        let selected = self
            .entries()
            .filter(|e| selector.select(e))
            .map(|e| (e.name.clone(), e.clone()))
            .collect();
        self.extract_entries(dest.as_ref(), selected, options)
    }

    /// Extracts `(stored name, entry)` pairs, writing each under the
    /// entry's own name. The two differ for entries renamed by an editor
    /// but not saved yet.
    pub(crate) fn extract_entries(
        &mut self,
        dest: &Path,
        selected: Vec<(String, ArchiveEntry)>,
        options: ExtractOptions,
    ) -> Result<ExtractResult> {
        fs::create_dir_all(dest)?;
        let ExtractOptions {
            overwrite,
            path_safety,
            preserve_mtime,
            password,
            mut progress,
        } = options;
        let budget = self.options.limits.budget();

        let mut result = ExtractResult::default();
        for (stored_name, entry) in selected {
            let target = validate_extract_path(&entry.name, dest, path_safety)?;
            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                result.directories_created += 1;
                continue;
            }
            if target.exists() {
                match overwrite {
                    OverwritePolicy::Error => {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("{} already exists", target.display()),
                        )));
                    }
                    OverwritePolicy::Skip => {
                        log::debug!("skipping existing {}", target.display());
                        result.entries_skipped += 1;
                        continue;
                    }
                    OverwritePolicy::Overwrite => {}
                }
            }
            let parent = target.parent().unwrap_or(dest);
            fs::create_dir_all(parent)?;

            if let Some(p) = progress.as_mut() {
                p.on_entry_start(&entry.name, entry.uncompressed_size);
            }
            let written = self.extract_file(
                &stored_name,
                parent,
                &target,
                password.as_ref(),
                &budget,
                &mut progress,
            );
            if let Some(p) = progress.as_mut() {
                p.on_entry_complete(&entry.name, written.is_ok());
            }
            result.bytes_extracted += written?;
            result.entries_extracted += 1;

            if preserve_mtime {
                if let Some(modified) = entry.modified() {
                    filetime::set_file_mtime(&target, modified.to_file_time())?;
                }
            }
        }
        Ok(result)
    }

    fn extract_file(
        &mut self,
        name: &str,
        parent: &Path,
        target: &Path,
        password: Option<&Password>,
        budget: &TotalBudget,
        progress: &mut Option<Box<dyn ProgressReporter>>,
    ) -> Result<u64> {
        let mut reader = self.open_entry(name, password, Some(budget))?;
        let total = reader.size();
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        let written = copy_decoded(&mut reader, staged.as_file_mut(), total, progress)?;
        staged.as_file_mut().flush()?;
        staged.persist(target).map_err(|e| Error::Io(e.error))?;
        Ok(written)
    }

    /// Tests every entry by decoding it and verifying its checksum or
    /// authentication code, without writing any output.
    ///
    /// Integrity, format and password failures are recorded per entry;
    /// I/O errors of the source abort the test.
    pub fn test(&mut self) -> Result<TestResult> {
        self.test_selected(())
    }

    /// Tests the entries chosen by `selector`.
    pub fn test_selected(&mut self, selector: impl EntrySelector) -> Result<TestResult> {
        let names: Vec<String> = self
            .entries()
            .filter(|e| selector.select(e))
            .map(|e| e.name.clone())
            .collect();
        let budget = self.options.limits.budget();
        let mut result = TestResult::default();
        for name in names {
            result.entries_tested += 1;
            let outcome = self.open_entry(&name, None, Some(&budget)).and_then(|mut reader| {
                let total = reader.size();
                copy_decoded(&mut reader, &mut io::sink(), total, &mut None)
            });
            match outcome {
                Ok(_) => result.entries_passed += 1,
                Err(Error::Io(e)) => return Err(Error::Io(e)),
                Err(e) => {
                    log::debug!("entry '{}' failed its test: {}", name, e);
                    result.entries_failed += 1;
                    result.failures.push((name, e.to_string()));
                }
            }
        }
        Ok(result)
    }
}
