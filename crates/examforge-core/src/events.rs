//! Semantic events emitted by a session for the UI to surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{SessionSnapshot, SubmitReason};

/// Broadcast channel capacity for session events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A snapshot write failed on every tier; the exam continues.
    SaveFailed { reason: String },
    /// A periodic snapshot was persisted.
    AutoSaved { at: DateTime<Utc> },
    /// Five minutes remain.
    TimeWarning { remaining_secs: u32 },
    /// One minute remains.
    FinalWarning { remaining_secs: u32 },
    /// The countdown reached zero; submission follows.
    Expired,
    /// The session was submitted and scored.
    Submitted {
        attempt_id: Uuid,
        percentage: u32,
        reason: SubmitReason,
    },
    /// An unfinished session was found for this exam.
    ResumeAvailable { snapshot: Box<SessionSnapshot> },
}

impl SessionEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SaveFailed { .. } => "save_failed",
            SessionEvent::AutoSaved { .. } => "auto_saved",
            SessionEvent::TimeWarning { .. } => "time_warning",
            SessionEvent::FinalWarning { .. } => "final_warning",
            SessionEvent::Expired => "expired",
            SessionEvent::Submitted { .. } => "submitted",
            SessionEvent::ResumeAvailable { .. } => "resume_available",
        }
    }
}
