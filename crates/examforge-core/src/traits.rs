//! Core trait definitions for the engine's collaborators.
//!
//! Persistence backends are implemented in `examforge-storage`; the attempt
//! history and bookmark stores in `examforge-history`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ExamError, StorageError};
use crate::model::{AttemptRecord, Bookmark, ExamDefinition};

// ---------------------------------------------------------------------------
// Persistence backend trait
// ---------------------------------------------------------------------------

/// A key/value persistence backend (remote, durable-local or in-memory).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Backend name used in logs (e.g. "remote").
    fn name(&self) -> &str;

    /// Overwrite the value stored under `key`.
    async fn save(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Load the value stored under `key`, or `None` if absent.
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Remove the value stored under `key`. Clearing an absent key succeeds.
    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Exam catalog trait
// ---------------------------------------------------------------------------

/// Supplies validated exam definitions.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Fetch an exam by id. Missing exams and fetch failures are `ExamError::Load`.
    async fn get_exam_by_id(&self, id: &str) -> Result<ExamDefinition, ExamError>;

    /// Ids and names of all exams the catalog knows about.
    async fn list_exams(&self) -> Result<Vec<(String, String)>, ExamError>;
}

// ---------------------------------------------------------------------------
// Long-lived collections fed by the session
// ---------------------------------------------------------------------------

/// Receives the attempt record written once per submitted session.
#[async_trait]
pub trait AttemptRecorder: Send + Sync {
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StorageError>;
}

/// Receives bookmark changes made during a session.
#[async_trait]
pub trait BookmarkRecorder: Send + Sync {
    /// Add a bookmark, replacing the note of an existing one with the same key.
    async fn add_bookmark(&self, bookmark: Bookmark) -> Result<(), StorageError>;

    /// Remove the bookmark for `(question_id, exam_id)` if present.
    async fn remove_bookmark(&self, question_id: &str, exam_id: &str)
        -> Result<(), StorageError>;
}

/// Recorder that drops everything. Useful for demo sessions.
pub struct NoopRecorder;

#[async_trait]
impl AttemptRecorder for NoopRecorder {
    async fn record_attempt(&self, _: &AttemptRecord) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl BookmarkRecorder for NoopRecorder {
    async fn add_bookmark(&self, _: Bookmark) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove_bookmark(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
