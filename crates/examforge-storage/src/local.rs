//! Durable local backend: one JSON file per key under a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use examforge_core::error::StorageError;
use examforge_core::traits::SnapshotStore;

const EXTENSION: &str = "json";

/// File-backed store. Writes go to a temp file first and are renamed into
/// place, so a crash never leaves a half-written value behind.
pub struct LocalStore {
    dir: PathBuf,
    max_bytes: Option<u64>,
    tmp_counter: AtomicU64,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: None,
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Cap the total size of stored values.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", encode_key(key)))
    }

    /// Bytes used by every stored value except `exclude`.
    async fn usage_excluding(&self, exclude: &Path) -> Result<u64, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut total = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path == exclude || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            total += entry.metadata().await?.len();
        }
        Ok(total)
    }
}

/// Map a key to a file stem. Characters outside `[A-Za-z0-9_-]` are
/// percent-encoded so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl SnapshotStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.path_for(key);

        if let Some(limit) = self.max_bytes {
            let needed = self.usage_excluding(&path).await? + bytes.len() as u64;
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            encode_key(key),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(key, path = %path.display(), bytes = bytes.len(), "wrote local value");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
