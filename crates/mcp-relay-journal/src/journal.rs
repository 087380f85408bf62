//! Journal sinks.
//!
//! A journal accepts one line at a time and appends it. Appending takes a
//! short lock and a single write, so callers are never held up for longer
//! than one small write.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::JournalError;

/// An append-only sink of newline-separated records.
pub trait Journal: Send + Sync + 'static {
    /// Appends one line. `line` must not contain a newline.
    fn write_line(&self, line: &str) -> Result<(), JournalError>;
}

impl dyn Journal {
    /// Serializes `record` as compact JSON and appends it.
    pub fn append<R: Serialize>(&self, record: &R) -> Result<(), JournalError> {
        let line = serde_json::to_string(record)?;
        self.write_line(&line)
    }
}

// ---------------------------------------------------------------------------
// FileJournal
// ---------------------------------------------------------------------------

/// A journal backed by a file opened in append mode.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileJournal {
    /// Opens (creating if needed) the file at `path`, including any
    /// missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "journal opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Opens `dir/file_name`.
    pub fn in_dir(
        dir: impl AsRef<Path>,
        file_name: &str,
    ) -> Result<Self, JournalError> {
        Self::open(dir.as_ref().join(file_name))
    }

    /// The file this journal appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn write_line(&self, line: &str) -> Result<(), JournalError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        // One write per line: a poisoned lock never guards a partial record.
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&buf)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryJournal
// ---------------------------------------------------------------------------

/// A journal that keeps its lines in memory. Handy for tests and for
/// embedding the relay without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    lines: Mutex<Vec<String>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every line appended so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every line that parses as `T`, in append order.
    pub fn records<T: DeserializeOwned>(&self) -> Vec<T> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Number of lines appended so far.
    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Journal for MemoryJournal {
    fn write_line(&self, line: &str) -> Result<(), JournalError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NullJournal
// ---------------------------------------------------------------------------

/// A journal that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn write_line(&self, _line: &str) -> Result<(), JournalError> {
        Ok(())
    }
}
