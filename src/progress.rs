//! Progress reporting for archive operations.
//!
//! Writers, readers and the editor report through [`ProgressReporter`]:
//! - entry opened and closed,
//! - bytes transferred within the current entry,
//! - save started and completed.
//!
//! Returning `false` from [`ProgressReporter::on_progress`] cancels the
//! operation with an [`std::io::ErrorKind::Interrupted`] error.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use zipforge::progress::StatisticsProgress;
//! use zipforge::{ArchivePath, Writer};
//!
//! let mut writer = Writer::create(Cursor::new(Vec::new()))?;
//! writer.set_progress(Box::new(StatisticsProgress::new()));
//! writer.add_bytes(ArchivePath::new("hello.txt")?, b"Hello")?;
//! let _ = writer.finish()?;
//! # Ok::<(), zipforge::Error>(())
//! ```

use std::io;
use std::time::{Duration, Instant};

/// Progress reporting trait for archive operations.
///
/// Every method has a no-op default, so implementors override only what
/// they display.
pub trait ProgressReporter: Send {
    /// Called when a save starts, with the number of entries to write.
    fn on_save_start(&mut self, entries: usize) {
        let _ = entries;
    }

    /// Called when a save ends.
    fn on_save_complete(&mut self, success: bool) {
        let _ = success;
    }

    /// Called when an entry is opened. `size` is 0 when unknown.
    fn on_entry_start(&mut self, entry_name: &str, size: u64) {
        let _ = (entry_name, size);
    }

    /// Called as bytes of the current entry are transferred.
    ///
    /// Returns `true` to continue or `false` to request cancellation.
    fn on_progress(&mut self, bytes_processed: u64, total_bytes: u64) -> bool {
        let _ = (bytes_processed, total_bytes);
        true
    }

    /// Called when an entry is sealed, with its uncompressed and stored sizes.
    fn on_ratio(&mut self, input_bytes: u64, output_bytes: u64) {
        let _ = (input_bytes, output_bytes);
    }

    /// Called when an entry is closed.
    fn on_entry_complete(&mut self, entry_name: &str, success: bool) {
        let _ = (entry_name, success);
    }

    /// Called on any warning during processing, such as a skipped entry.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }
}

/// The error returned when a reporter cancels an operation.
pub(crate) fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "operation cancelled by progress reporter")
}

/// Progress state with timing and rate calculation.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Size of the current entry, 0 when unknown.
    pub total_bytes: u64,
    /// Bytes of the current entry processed so far.
    pub processed_bytes: u64,
    /// Uncompressed bytes of all closed entries.
    pub unpacked_bytes: u64,
    /// Stored bytes of all closed entries.
    pub packed_bytes: u64,
    /// Current entry being processed.
    pub current_entry: Option<String>,
    /// Number of entries processed.
    pub entries_processed: usize,
    /// Number of entries that failed or were skipped.
    pub entries_failed: usize,
    /// Total number of entries, when known.
    pub entries_total: usize,
    /// Processing start time.
    pub start_time: Instant,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            total_bytes: 0,
            processed_bytes: 0,
            unpacked_bytes: 0,
            packed_bytes: 0,
            current_entry: None,
            entries_processed: 0,
            entries_failed: 0,
            entries_total: 0,
            start_time: Instant::now(),
        }
    }
}

impl ProgressState {
    /// Creates a new progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completion percentage of the current entry (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.processed_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Returns the compression ratio (packed / unpacked).
    pub fn compression_ratio(&self) -> f64 {
        if self.unpacked_bytes == 0 {
            1.0
        } else {
            self.packed_bytes as f64 / self.unpacked_bytes as f64
        }
    }

    /// Returns elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the processing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            (self.unpacked_bytes + self.processed_bytes) as f64 / elapsed
        }
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A progress reporter that collects statistics.
#[derive(Debug, Default, Clone)]
pub struct StatisticsProgress {
    /// The progress state.
    pub state: ProgressState,
    /// Whether cancellation was requested.
    pub cancelled: bool,
    /// Warnings collected.
    pub warnings: Vec<String>,
    /// Number of saves completed successfully.
    pub saves_completed: usize,
}

impl StatisticsProgress {
    /// Creates a new statistics progress reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected state.
    pub fn state(&self) -> &ProgressState {
        &self.state
    }
}

impl ProgressReporter for StatisticsProgress {
    fn on_save_start(&mut self, entries: usize) {
        self.state.entries_total = entries;
    }

    fn on_save_complete(&mut self, success: bool) {
        if success {
            self.saves_completed += 1;
        }
    }

    fn on_entry_start(&mut self, entry_name: &str, size: u64) {
        self.state.current_entry = Some(entry_name.to_string());
        self.state.total_bytes = size;
        self.state.processed_bytes = 0;
    }

    fn on_progress(&mut self, bytes_processed: u64, _total_bytes: u64) -> bool {
        self.state.processed_bytes = bytes_processed;
        !self.cancelled
    }

    fn on_ratio(&mut self, input_bytes: u64, output_bytes: u64) {
        self.state.unpacked_bytes += input_bytes;
        self.state.packed_bytes += output_bytes;
    }

    fn on_entry_complete(&mut self, _entry_name: &str, success: bool) {
        self.state.entries_processed += 1;
        if !success {
            self.state.entries_failed += 1;
        }
        self.state.current_entry = None;
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

/// A progress reporter that calls a closure.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    /// Creates a progress reporter from a closure.
    ///
    /// The closure receives (bytes_processed, total_bytes) and returns
    /// `true` to continue or `false` to cancel.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    fn on_progress(&mut self, bytes_processed: u64, total_bytes: u64) -> bool {
        (self.callback)(bytes_processed, total_bytes)
    }
}

/// Creates a closure-based progress reporter.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    ClosureProgress::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress() {
        let mut progress = NoProgress;
        assert!(progress.on_progress(50, 100));
    }

    #[test]
    fn test_statistics_progress() {
        let mut progress = StatisticsProgress::new();
        progress.on_save_start(2);
        progress.on_entry_start("a.txt", 500);
        progress.on_progress(250, 500);
        assert!((progress.state().percentage() - 50.0).abs() < 0.001);
        progress.on_ratio(500, 100);
        progress.on_entry_complete("a.txt", true);
        progress.on_entry_start("b.txt", 0);
        progress.on_entry_complete("b.txt", false);
        progress.on_save_complete(true);

        let state = progress.state();
        assert_eq!(state.entries_total, 2);
        assert_eq!(state.entries_processed, 2);
        assert_eq!(state.entries_failed, 1);
        assert!((state.compression_ratio() - 0.2).abs() < 0.001);
        assert_eq!(progress.saves_completed, 1);
    }

    #[test]
    fn test_statistics_cancellation() {
        let mut progress = StatisticsProgress::new();
        assert!(progress.on_progress(50, 100));
        progress.cancelled = true;
        assert!(!progress.on_progress(75, 100));
    }

    #[test]
    fn test_closure_progress() {
        let mut count = 0;
        let mut progress = progress_fn(|bytes, total| {
            count += 1;
            bytes < total
        });

        assert!(progress.on_progress(50, 100));
        assert!(!progress.on_progress(100, 100));
        drop(progress);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_cancelled_error_kind() {
        assert_eq!(cancelled().kind(), io::ErrorKind::Interrupted);
    }
}
