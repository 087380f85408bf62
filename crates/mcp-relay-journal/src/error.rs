//! Error types for the journal layer.

/// Errors that can occur while appending to a journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Opening or writing the backing file failed.
    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized to JSON.
    #[error("journal record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
