//! Fresh-start vs. resume decision at session init.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::ExamError;
use crate::model::{Answers, ExamDefinition, SessionSnapshot, SessionStatus};
use crate::persistence::PersistenceLayer;

/// What the persisted state allows for an exam.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    /// No unfinished session; start fresh.
    Fresh,
    /// An in-progress snapshot exists; the caller chooses.
    Available(SessionSnapshot),
}

/// The caller's answer to [`ResumeDecision::Available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    StartNew,
}

/// Looks up and discards persisted snapshots.
pub struct ResumeManager {
    persistence: Arc<PersistenceLayer>,
}

impl ResumeManager {
    pub fn new(persistence: Arc<PersistenceLayer>) -> Self {
        Self { persistence }
    }

    /// Inspect the stored snapshot for `exam_id`.
    ///
    /// Only an `InProgress` snapshot for the same exam is offered; anything
    /// else (missing, completed, paused, unreadable) means a silent fresh start.
    pub async fn inspect(&self, exam_id: &str) -> ResumeDecision {
        match self.persistence.load_snapshot(exam_id).await {
            Some(snapshot)
                if snapshot.status == SessionStatus::InProgress && snapshot.exam_id == exam_id =>
            {
                tracing::info!(
                    exam_id,
                    remaining_secs = snapshot.remaining_time_secs,
                    answered = snapshot.answers.len(),
                    "unfinished session found"
                );
                ResumeDecision::Available(snapshot)
            }
            Some(snapshot) => {
                tracing::debug!(exam_id, status = %snapshot.status, "ignoring stored snapshot");
                ResumeDecision::Fresh
            }
            None => ResumeDecision::Fresh,
        }
    }

    /// Drop the stored snapshot so the next session starts fresh.
    pub async fn discard(&self, exam_id: &str) -> bool {
        self.persistence.clear_snapshot(exam_id).await
    }
}

/// Session state rebuilt from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Rehydrated {
    pub answers: Answers,
    pub current_index: usize,
    pub flagged: BTreeSet<String>,
    pub bookmarked: BTreeSet<String>,
    pub remaining_secs: u32,
}

/// Restore session state from `snapshot` verbatim.
///
/// Remaining time is taken as stored: time elapsed while the session was
/// closed is not deducted. Values outside the exam's bounds are clamped.
pub fn rehydrate(
    exam: &ExamDefinition,
    snapshot: &SessionSnapshot,
) -> Result<Rehydrated, ExamError> {
    if snapshot.exam_id != exam.id {
        return Err(ExamError::SnapshotMismatch {
            expected: exam.id.clone(),
            found: snapshot.exam_id.clone(),
        });
    }
    let last_index = exam.questions.len().saturating_sub(1);
    Ok(Rehydrated {
        answers: snapshot.answers.clone(),
        current_index: snapshot.current_question_index.min(last_index),
        flagged: snapshot.flagged_question_ids.clone(),
        bookmarked: snapshot.bookmarked_question_ids.clone(),
        remaining_secs: snapshot.remaining_time_secs.min(exam.time_limit_secs()),
    })
}
