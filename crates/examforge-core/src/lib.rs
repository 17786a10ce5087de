//! examforge-core: Exam session engine.
//!
//! This crate defines the data model, the collaborator traits and the
//! session state machine with its timer, auto-save schedule, resume logic
//! and scoring. Persistence backends live in `examforge-storage`, the
//! long-lived history stores in `examforge-history`.

pub mod autosave;
pub mod catalog;
pub mod error;
pub mod events;
pub mod model;
pub mod persistence;
pub mod resume;
pub mod scoring;
pub mod session;
pub mod statistics;
pub mod timer;
pub mod traits;

pub use error::{ExamError, StorageError};
pub use events::SessionEvent;
pub use persistence::{PersistenceLayer, PersistenceOptions};
pub use session::{ExamSession, SessionConfig, SessionServices, SubmitOutcome};
