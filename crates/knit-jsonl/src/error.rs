//! Transport errors.

use std::io;
use thiserror::Error;

/// Failure reading or writing a JSONL stream.
///
/// Only strict reads produce [`Error::InvalidFormat`]; resilient reads turn a
/// bad line into a [`crate::Warning`] and keep going.
#[derive(Debug, Error)]
pub enum Error {
    /// The file or stream could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A line is not a valid record.
    #[error("line {line_number} is not a valid record: {message}")]
    InvalidFormat {
        /// 1-based line number
        line_number: usize,
        /// Decoder message
        message: String,
    },
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
