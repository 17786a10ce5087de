//! In-memory backend for tests and demo sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use examforge_core::error::StorageError;
use examforge_core::traits::SnapshotStore;

/// An ephemeral store with switchable failures and call counters.
///
/// Nothing survives the process, so it is only used when explicitly
/// selected, never as a fallback tier.
pub struct MemoryStore {
    name: String,
    data: Mutex<HashMap<String, Value>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    save_count: AtomicU32,
    load_count: AtomicU32,
    clear_count: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store reporting `name` in logs, handy when two sit in one layer.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Mutex::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            save_count: AtomicU32::new(0),
            load_count: AtomicU32::new(0),
            clear_count: AtomicU32::new(0),
        }
    }

    /// Make every call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::Relaxed);
        self.fail_loads.store(failing, Ordering::Relaxed);
    }

    /// Fail only saves and clears.
    pub fn set_fail_saves(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::Relaxed);
    }

    pub fn set_fail_loads(&self, failing: bool) {
        self.fail_loads.store(failing, Ordering::Relaxed);
    }

    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::Relaxed)
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count.load(Ordering::Relaxed)
    }

    /// Peek at a stored value without counting a load.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data().get(key).cloned()
    }

    /// Seed a value without counting a save.
    pub fn insert(&self, key: &str, value: Value) {
        self.data().insert(key.to_string(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn data(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.data.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable(format!("{} store is failing", self.name))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.save_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(self.unavailable());
        }
        self.data().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.load_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(self.unavailable());
        }
        Ok(self.get(key))
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.clear_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(self.unavailable());
        }
        self.data().remove(key);
        Ok(())
    }
}
