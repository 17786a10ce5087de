//! History error types.

use thiserror::Error;

use examforge_core::error::StorageError;

/// Errors from importing an export document.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The input is not a JSON export document.
    #[error("malformed export: {0}")]
    Malformed(String),

    /// The document was written by a newer format version.
    #[error("unsupported export version {found} (newest supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// The merged collections could not be persisted.
    #[error("import not saved: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from changing a setting.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("settings not saved: {0}")]
    Storage(#[from] StorageError),
}
