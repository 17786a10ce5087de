//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use examforge_core::PersistenceLayer;
use examforge_history::HistoryStores;
use examforge_storage::{create_persistence, load_config_from, ExamforgeConfig};

pub mod bookmarks;
pub mod history;
pub mod init;
pub mod settings;
pub mod take;
pub mod transfer;
pub mod validate;

/// Loaded configuration plus the stores built from it.
pub struct AppContext {
    pub config: ExamforgeConfig,
    pub persistence: Arc<PersistenceLayer>,
    pub stores: HistoryStores,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config_from(config_path)?;
        let persistence = Arc::new(create_persistence(&config.storage)?);
        let stores = HistoryStores::new(Arc::clone(&persistence));
        Ok(Self {
            config,
            persistence,
            stores,
        })
    }
}

/// Format seconds as `m:ss`.
pub fn format_duration(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
