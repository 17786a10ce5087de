//! examforge-history: Long-lived collections fed by exam sessions.
//!
//! Attempt history and bookmarks are append-only, most-recent-first and
//! capped; settings merge over defaults. All three persist through the
//! core `PersistenceLayer`, and can be exported to and imported from a
//! single JSON document.

pub mod attempts;
pub mod bookmarks;
pub mod error;
pub mod export;
pub mod settings;

pub use attempts::{AttemptHistory, HISTORY_KEY};
pub use bookmarks::{BookmarkStore, BOOKMARKS_KEY};
pub use error::{ImportError, SettingsError};
pub use export::{ExportDocument, HistoryStores, ImportSummary, EXPORT_VERSION};
pub use settings::{Settings, SettingsStore, SETTINGS_KEY};

/// Maximum entries kept in each collection; the oldest are evicted.
pub const MAX_ENTRIES: usize = 50;
