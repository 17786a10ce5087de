//! Tiered persistence facade.
//!
//! Wraps a primary backend and an optional fallback behind the
//! `save -> bool` / `load -> Option` / `clear -> bool` surface the engine
//! uses. Backend failures are logged and converted, never propagated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::model::{snapshot_key, SessionSnapshot};
use crate::traits::SnapshotStore;

/// Options fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceOptions {
    /// Fall through to the fallback tier when the primary fails.
    pub fallback_enabled: bool,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
        }
    }
}

/// Ordered backends tried in sequence until one succeeds.
pub struct PersistenceLayer {
    primary: Arc<dyn SnapshotStore>,
    fallback: Option<Arc<dyn SnapshotStore>>,
    options: PersistenceOptions,
    next_sequence: AtomicU64,
    /// Last accepted snapshot sequence per key. Held across the write so
    /// snapshot saves are serialized.
    watermarks: Mutex<HashMap<String, u64>>,
}

impl PersistenceLayer {
    pub fn new(
        primary: Arc<dyn SnapshotStore>,
        fallback: Option<Arc<dyn SnapshotStore>>,
        options: PersistenceOptions,
    ) -> Self {
        Self {
            primary,
            fallback,
            options,
            next_sequence: AtomicU64::new(1),
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// A layer with a single backend and no fallback.
    pub fn single(store: Arc<dyn SnapshotStore>) -> Self {
        Self::new(
            store,
            None,
            PersistenceOptions {
                fallback_enabled: false,
            },
        )
    }

    /// Names of the active tiers, in the order they are tried.
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers().map(|t| t.name().to_string()).collect()
    }

    /// Next value of the layer's monotonic snapshot sequence.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn tiers(&self) -> impl Iterator<Item = &Arc<dyn SnapshotStore>> {
        let fallback = if self.options.fallback_enabled {
            self.fallback.as_ref()
        } else {
            None
        };
        std::iter::once(&self.primary).chain(fallback)
    }

    /// Serialize and save `value`. Returns `false` if every tier failed.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.try_save(key, value).await.is_ok()
    }

    /// Like [`save`](Self::save) but reports the last error.
    pub async fn try_save<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|e| {
            tracing::error!(key, "failed to serialize value: {e}");
            StorageError::from(e)
        })?;
        self.save_value(key, &value).await
    }

    async fn save_value(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut last_error = None;
        for tier in self.tiers() {
            match tier.save(key, value).await {
                Ok(()) => {
                    tracing::debug!(key, tier = tier.name(), "saved");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(key, tier = tier.name(), "save failed: {e}");
                    let recoverable = e.is_recoverable();
                    last_error = Some(e);
                    if !recoverable {
                        break;
                    }
                }
            }
        }
        let err = last_error.unwrap_or_else(|| StorageError::Unavailable("no tiers".into()));
        tracing::error!(key, "save failed on every tier: {err}");
        Err(err)
    }

    /// Load and deserialize the value under `key` from the first tier that
    /// holds a decodable one. A primary that reports the key absent defers
    /// to the fallback.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        for tier in self.tiers() {
            let value = match tier.load(key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key, tier = tier.name(), "load failed: {e}");
                    continue;
                }
            };
            match serde_json::from_value::<T>(value) {
                Ok(parsed) => return Some(parsed),
                Err(e) => {
                    tracing::warn!(key, tier = tier.name(), "stored value is malformed: {e}");
                }
            }
        }
        None
    }

    /// Like [`load`](Self::load), but tells "absent" apart from "unreadable"
    /// so read-modify-write callers never save over data they could not read.
    ///
    /// Fails if the first stored value does not decode, or if no tier holds
    /// the key and any tier could not be read.
    pub async fn try_load<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let mut last_error = None;
        for tier in self.tiers() {
            match tier.load(key).await {
                Ok(Some(value)) => {
                    return serde_json::from_value::<T>(value).map(Some).map_err(|e| {
                        tracing::warn!(key, tier = tier.name(), "stored value is malformed: {e}");
                        StorageError::from(e)
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key, tier = tier.name(), "load failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Remove `key` from every tier. Returns `false` if the primary could
    /// not be cleared; the fallback is then left as is, since it may hold
    /// the newest copy.
    pub async fn clear(&self, key: &str) -> bool {
        if let Err(e) = self.primary.clear(key).await {
            tracing::error!(key, tier = self.primary.name(), "clear failed: {e}");
            return false;
        }
        tracing::debug!(key, tier = self.primary.name(), "cleared");

        for tier in self.tiers().skip(1) {
            match tier.clear(key).await {
                Ok(()) => tracing::debug!(key, tier = tier.name(), "cleared"),
                Err(e) => tracing::warn!(key, tier = tier.name(), "clear failed: {e}"),
            }
        }
        true
    }

    /// Save a session snapshot, rejecting writes older than the last
    /// accepted sequence for the same exam.
    pub async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let key = snapshot_key(&snapshot.exam_id);
        let mut watermarks = self.watermarks.lock().await;
        if let Some(&last_accepted) = watermarks.get(&key) {
            if snapshot.sequence < last_accepted {
                tracing::debug!(
                    key = %key,
                    sequence = snapshot.sequence,
                    last_accepted,
                    "dropping stale snapshot"
                );
                return Err(StorageError::Stale {
                    key,
                    sequence: snapshot.sequence,
                    last_accepted,
                });
            }
        }
        watermarks.insert(key.clone(), snapshot.sequence);
        self.try_save(&key, snapshot).await
    }

    /// The most recently saved snapshot for an exam across all tiers.
    pub async fn load_snapshot(&self, exam_id: &str) -> Option<SessionSnapshot> {
        let key = snapshot_key(exam_id);
        let mut newest: Option<SessionSnapshot> = None;
        for tier in self.tiers() {
            let value = match tier.load(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %key, tier = tier.name(), "load failed: {e}");
                    continue;
                }
            };
            match serde_json::from_value::<SessionSnapshot>(value) {
                Ok(snapshot) => {
                    if newest
                        .as_ref()
                        .map_or(true, |n| snapshot.last_saved_at > n.last_saved_at)
                    {
                        newest = Some(snapshot);
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, tier = tier.name(), "stored snapshot is malformed: {e}");
                }
            }
        }
        newest
    }

    /// Clear the snapshot for an exam. The sequence watermark is kept so a
    /// late in-flight write cannot resurrect it.
    pub async fn clear_snapshot(&self, exam_id: &str) -> bool {
        let key = snapshot_key(exam_id);
        let _guard = self.watermarks.lock().await;
        self.clear(&key).await
    }
}
