//! Configuration and persistence factory.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::persistence::{PersistenceLayer, PersistenceOptions};
use examforge_core::traits::SnapshotStore;

use crate::local::LocalStore;
use crate::mock::MemoryStore;
use crate::remote::{RemoteStore, DEFAULT_TIMEOUT_SECS};

/// Which backend is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Remote service, with the local directory as fallback.
    Remote,
    /// Local directory only.
    #[default]
    Local,
    /// In-memory only; nothing survives the process.
    Mock,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(StorageMode::Remote),
            "local" => Ok(StorageMode::Local),
            "mock" | "memory" => Ok(StorageMode::Mock),
            other => Err(format!("unknown storage mode: {other}")),
        }
    }
}

/// Remote tier settings.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Durable-local tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_dir")]
    pub dir: PathBuf,
    /// Total bytes the local store may hold.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dir: default_local_dir(),
            max_bytes: None,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub mode: StorageMode,
    /// Fall through to the local tier when the remote one fails.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            fallback_enabled: true,
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    /// Directory of exam definition files.
    #[serde(default = "default_exam_dir")]
    pub exam_dir: PathBuf,
    /// Auto-save period in seconds.
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_secs: u64,
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            exam_dir: default_exam_dir(),
            auto_save_interval_secs: default_auto_save_interval(),
        }
    }
}

impl ExamforgeConfig {
    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_local_dir() -> PathBuf {
    PathBuf::from("./.examforge")
}
fn default_exam_dir() -> PathBuf {
    PathBuf::from("./exams")
}
fn default_auto_save_interval() -> u64 {
    30
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Apply `EXAMFORGE_*` overrides looked up through `var`.
fn apply_env_overrides(
    config: &mut ExamforgeConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(url) = var("EXAMFORGE_REMOTE_URL") {
        config.storage.remote.base_url = Some(url);
    }
    if let Some(token) = var("EXAMFORGE_REMOTE_TOKEN") {
        config.storage.remote.api_token = Some(token);
    }
    if let Some(mode) = var("EXAMFORGE_STORAGE_MODE") {
        config.storage.mode = mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("EXAMFORGE_STORAGE_MODE: {e}"))?;
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_REMOTE_URL`,
/// `EXAMFORGE_REMOTE_TOKEN`, `EXAMFORGE_STORAGE_MODE`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            toml::from_str::<ExamforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamforgeConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    let remote = &mut config.storage.remote;
    remote.base_url = remote
        .base_url
        .as_deref()
        .map(resolve_env_vars)
        .filter(|u| !u.is_empty());
    remote.api_token = remote
        .api_token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

fn local_store(config: &LocalConfig) -> LocalStore {
    let store = LocalStore::new(&config.dir);
    match config.max_bytes {
        Some(limit) => store.with_max_bytes(limit),
        None => store,
    }
}

/// Build the persistence layer selected by `config.mode`.
///
/// Remote mode uses the local directory as its fallback tier; the mock
/// store is never a fallback.
pub fn create_persistence(config: &StorageConfig) -> Result<PersistenceLayer> {
    let layer = match config.mode {
        StorageMode::Remote => {
            let base_url = config
                .remote
                .base_url
                .as_deref()
                .context("storage.mode = \"remote\" requires storage.remote.base_url")?;
            let remote = RemoteStore::new(
                base_url,
                config.remote.api_token.clone(),
                config.remote.timeout_secs,
            )?;
            PersistenceLayer::new(
                Arc::new(remote),
                Some(Arc::new(local_store(&config.local)) as Arc<dyn SnapshotStore>),
                PersistenceOptions {
                    fallback_enabled: config.fallback_enabled,
                },
            )
        }
        StorageMode::Local => PersistenceLayer::single(Arc::new(local_store(&config.local))),
        StorageMode::Mock => PersistenceLayer::single(Arc::new(MemoryStore::new())),
    };

    tracing::info!(mode = ?config.mode, tiers = ?layer.tier_names(), "persistence ready");
    Ok(layer)
}
