//! Entry selectors for bulk operations.
//!
//! Anything implementing [`EntrySelector`] can pick the entries an
//! extraction, test or edit touches. Closures, name lists and `()` (select
//! everything) work out of the box.

use crate::directory::ArchiveEntry;

/// Decides whether an entry takes part in a bulk operation.
pub trait EntrySelector {
    /// Returns true if the entry should be selected.
    fn select(&self, entry: &ArchiveEntry) -> bool;
}

/// Selector that matches all entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl EntrySelector for SelectAll {
    fn select(&self, _entry: &ArchiveEntry) -> bool {
        true
    }
}

/// Selector that matches entries by exact names.
#[derive(Debug, Clone)]
pub struct SelectByName {
    names: Vec<String>,
}

impl SelectByName {
    /// Creates a selector for the given names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl EntrySelector for SelectByName {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        self.names.iter().any(|name| entry.name == *name)
    }
}

/// Selector that matches a directory prefix, the directory entry included.
///
/// ```rust
/// use zipforge::read::SelectByPrefix;
///
/// let docs = SelectByPrefix::new("docs");
/// # let _ = docs;
/// ```
#[derive(Debug, Clone)]
pub struct SelectByPrefix {
    prefix: String,
}

impl SelectByPrefix {
    /// Creates a selector for everything under `directory`.
    pub fn new(directory: impl Into<String>) -> Self {
        let mut prefix = directory.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix }
    }
}

impl EntrySelector for SelectByPrefix {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        entry.name.starts_with(&self.prefix)
    }
}

/// Selector that matches entries by a predicate function.
pub struct SelectByPredicate<F> {
    predicate: F,
}

impl<F: Fn(&ArchiveEntry) -> bool> SelectByPredicate<F> {
    /// Creates a selector with the given predicate.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F: Fn(&ArchiveEntry) -> bool> EntrySelector for SelectByPredicate<F> {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        (self.predicate)(entry)
    }
}

/// Selector that matches only files (not directories).
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectFilesOnly;

impl EntrySelector for SelectFilesOnly {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        entry.is_file()
    }
}

/// `()` selects every entry.
///
/// ```rust,ignore
/// archive.extract_to_dir("./output", (), &ExtractOptions::default())?;
/// ```
impl EntrySelector for () {
    fn select(&self, _entry: &ArchiveEntry) -> bool {
        true
    }
}

impl<F: Fn(&ArchiveEntry) -> bool> EntrySelector for F {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        self(entry)
    }
}

impl EntrySelector for &[&str] {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        self.iter().any(|name| entry.name == *name)
    }
}

impl EntrySelector for Vec<String> {
    fn select(&self, entry: &ArchiveEntry) -> bool {
        self.iter().any(|name| entry.name == *name)
    }
}
