//! Error types for knit operations.
//!
//! Outcomes are split the same way the pipeline is:
//!
//! - **`Error`**: structural failures that abort a resolution unit or a store
//!   operation (malformed input, identity collisions, unreachable
//!   collaborators, I/O)
//! - **`Diagnostic`** (see [`crate::diagnostics`]): per-relationship problems
//!   that are logged, collected and skipped
//!
//! ## Error Philosophy
//!
//! A file with one bad reference still contributes everything that did
//! resolve. Only a broken upstream contract (an element without a usable id)
//! or a broken identity scheme (two entities, one id) stops a run, because
//! continuing would write a graph that can never converge.
//!
//! ## Error Categorization
//!
//! - Integrity violations: `MalformedElement`, `IdentityCollision`
//! - Retryable: `CollaboratorUnavailable`
//! - Everything else is an input or environment problem for the caller

use thiserror::Error;

/// Result type for knit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for knit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An element or descriptor lacks the fields needed to identify it.
    #[error("malformed element{}: {reason}", element_suffix(.element))]
    MalformedElement {
        /// The element's id or name, when one is available
        element: Option<String>,
        /// What is missing or invalid
        reason: String,
    },

    /// Two distinct entities produced the same identity.
    #[error("identity collision on {id}: {first} vs {second}")]
    IdentityCollision {
        /// The colliding canonical id or GID
        id: String,
        /// Description of the first entity
        first: String,
        /// Description of the second entity
        second: String,
    },

    /// The ID service or graph store could not be reached. Safe to retry.
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        /// Which collaborator failed
        collaborator: &'static str,
        /// Underlying failure
        message: String,
    },

    /// A `FileIr` record declares a schema version this build cannot read.
    #[error("unsupported IR schema version {found} in {file_path} (supported: {supported})")]
    UnsupportedSchema {
        /// File the record describes
        file_path: String,
        /// Version found in the record
        found: u32,
        /// Version this build reads
        supported: u32,
    },

    /// A `FileIr` record belongs to a different project than its batch.
    #[error("project mismatch for {file_path}: batch is {expected}, record is {found}")]
    ProjectMismatch {
        /// File the record describes
        file_path: String,
        /// Batch project id
        expected: String,
        /// Record project id
        found: String,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSONL transport failed
    #[error("JSONL error: {0}")]
    Jsonl(#[from] knit_jsonl::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),
}

fn element_suffix(element: &Option<String>) -> String {
    element.as_ref().map(|e| format!(" {e}")).unwrap_or_default()
}

impl Error {
    /// Shorthand for a [`Error::MalformedElement`].
    pub fn malformed(element: Option<&str>, reason: impl Into<String>) -> Self {
        Self::MalformedElement {
            element: element.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the operation may succeed when retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }

    /// Returns `true` if this error means the input or identity scheme is
    /// broken, so the current resolution unit must be abandoned.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::MalformedElement { .. } | Self::IdentityCollision { .. }
        )
    }
}
