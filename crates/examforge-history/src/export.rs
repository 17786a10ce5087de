//! Export and import of the long-lived collections as one JSON document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use examforge_core::model::{AttemptRecord, Bookmark};
use examforge_core::persistence::PersistenceLayer;

use crate::attempts::AttemptHistory;
use crate::bookmarks::BookmarkStore;
use crate::error::ImportError;
use crate::settings::{Settings, SettingsStore};

/// Current export format version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    pub attempts: Vec<AttemptRecord>,
    pub bookmarks: Vec<Bookmark>,
    pub settings: Settings,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
}

/// What an import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub attempts: usize,
    pub bookmarks: usize,
    pub settings: bool,
    /// Entries dropped because they did not parse.
    pub skipped: usize,
}

/// The three history collections over one persistence layer.
pub struct HistoryStores {
    pub attempts: Arc<AttemptHistory>,
    pub bookmarks: Arc<BookmarkStore>,
    pub settings: SettingsStore,
}

impl HistoryStores {
    pub fn new(persistence: Arc<PersistenceLayer>) -> Self {
        Self {
            attempts: Arc::new(AttemptHistory::new(Arc::clone(&persistence))),
            bookmarks: Arc::new(BookmarkStore::new(Arc::clone(&persistence))),
            settings: SettingsStore::new(persistence),
        }
    }

    pub async fn export(&self) -> ExportDocument {
        ExportDocument {
            version: EXPORT_VERSION,
            attempts: self.attempts.all().await,
            bookmarks: self.bookmarks.all().await,
            settings: self.settings.get().await,
            exported_at: Utc::now(),
        }
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export().await)
    }

    /// Merge an export document into the stores.
    ///
    /// Best effort: individual entries that fail to parse are skipped and
    /// counted, the rest replace stored entries with the same key.
    pub async fn import_json(&self, json: &str) -> Result<ImportSummary, ImportError> {
        let document: Value =
            serde_json::from_str(json).map_err(|e| ImportError::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = document else {
            return Err(ImportError::Malformed("expected a JSON object".into()));
        };

        let version = fields
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| ImportError::Malformed("missing version".into()))?;
        if version == 0 || version > u64::from(EXPORT_VERSION) {
            return Err(ImportError::UnsupportedVersion {
                found: version,
                supported: EXPORT_VERSION,
            });
        }

        let mut summary = ImportSummary::default();
        let attempts: Vec<AttemptRecord> =
            parse_entries(fields.remove("attempts"), "attempts", &mut summary.skipped)?;
        let bookmarks: Vec<Bookmark> =
            parse_entries(fields.remove("bookmarks"), "bookmarks", &mut summary.skipped)?;

        summary.attempts = attempts.len();
        summary.bookmarks = bookmarks.len();
        if !attempts.is_empty() {
            self.attempts.merge(attempts).await?;
        }
        if !bookmarks.is_empty() {
            self.bookmarks.merge(bookmarks).await?;
        }

        if let Some(raw) = fields.remove("settings") {
            match serde_json::from_value::<Settings>(raw) {
                Ok(settings) => {
                    self.settings.replace(&settings).await?;
                    summary.settings = true;
                }
                Err(e) => {
                    tracing::warn!("skipping malformed settings: {e}");
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            attempts = summary.attempts,
            bookmarks = summary.bookmarks,
            settings = summary.settings,
            skipped = summary.skipped,
            "import complete"
        );
        Ok(summary)
    }

    /// [`import_json`](Self::import_json) reduced to success or failure.
    pub async fn import(&self, json: &str) -> bool {
        match self.import_json(json).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("import failed: {e}");
                false
            }
        }
    }
}

/// Parse an optional array field entry by entry, counting failures.
fn parse_entries<T: DeserializeOwned>(
    raw: Option<Value>,
    field: &str,
    skipped: &mut usize,
) -> Result<Vec<T>, ImportError> {
    let items = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ImportError::Malformed(format!("{field} is not an array"))),
    };

    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value(item) {
            Ok(entry) => parsed.push(entry),
            Err(e) => {
                tracing::warn!(field, "skipping malformed entry: {e}");
                *skipped += 1;
            }
        }
    }
    Ok(parsed)
}
