//! Error types for the exam engine and its persistence backends.
//!
//! `StorageError` is defined here rather than in `examforge-storage` so the
//! persistence layer can classify backend failures without string matching.

use thiserror::Error;

use crate::model::SessionStatus;

/// Errors surfaced by the session engine and the catalog.
#[derive(Debug, Error)]
pub enum ExamError {
    /// The exam definition could not be fetched or did not validate.
    #[error("failed to load exam '{exam_id}': {reason}")]
    Load { exam_id: String, reason: String },

    /// The operation is not allowed in the session's current status.
    #[error("cannot {operation} while session is {status}")]
    InvalidState {
        operation: &'static str,
        status: SessionStatus,
    },

    /// The exam has no questions, so it cannot be started.
    #[error("exam '{0}' has no questions")]
    EmptyExam(String),

    /// A question id that is not part of the exam.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// A snapshot belongs to a different exam than the session.
    #[error("snapshot is for exam '{found}', expected '{expected}'")]
    SnapshotMismatch { expected: String, found: String },
}

impl ExamError {
    pub fn load(exam_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ExamError::Load {
            exam_id: exam_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for misuse errors the UI may safely ignore.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ExamError::InvalidState { .. })
    }
}

/// Errors that can occur when reading or writing a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A network error talking to the remote store.
    #[error("network error: {0}")]
    Network(String),

    /// The remote store returned a non-success response.
    #[error("storage API error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    /// The value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A filesystem error in the local store.
    #[error("I/O error: {0}")]
    Io(String),

    /// The local store's byte quota would be exceeded.
    #[error("storage quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: u64, limit: u64 },

    /// A snapshot write older than the last accepted one for the key.
    #[error("stale write for '{key}': sequence {sequence} < {last_accepted}")]
    Stale {
        key: String,
        sequence: u64,
        last_accepted: u64,
    },

    /// The backend is switched off or failing on purpose.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns `true` if trying the next tier could help.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StorageError::Stale { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
