//! User preferences merged over defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use examforge_core::error::StorageError;
use examforge_core::persistence::PersistenceLayer;

use crate::error::SettingsError;

/// Storage key of the settings document.
pub const SETTINGS_KEY: &str = "user_settings";

/// User preferences. Missing fields take their default, so a partial stored
/// document still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `light`, `dark` or `system`.
    pub theme: String,
    pub show_timer: bool,
    pub confirm_before_submit: bool,
    pub auto_save: bool,
    pub show_hints: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            show_timer: true,
            confirm_before_submit: true,
            auto_save: true,
            show_hints: false,
        }
    }
}

const THEMES: &[&str] = &["light", "dark", "system"];

impl Settings {
    /// Names accepted by [`Settings::apply`].
    pub const KEYS: &'static [&'static str] = &[
        "theme",
        "show_timer",
        "confirm_before_submit",
        "auto_save",
        "show_hints",
    ];

    /// Set one field from its textual form.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let flag = |field: &mut bool| -> Result<(), SettingsError> {
            *field = parse_bool(value).ok_or_else(|| SettingsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: "true or false",
            })?;
            Ok(())
        };
        match key {
            "theme" => {
                let theme = value.trim().to_lowercase();
                if !THEMES.contains(&theme.as_str()) {
                    return Err(SettingsError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "light, dark or system",
                    });
                }
                self.theme = theme;
                Ok(())
            }
            "show_timer" => flag(&mut self.show_timer),
            "confirm_before_submit" => flag(&mut self.confirm_before_submit),
            "auto_save" => flag(&mut self.auto_save),
            "show_hints" => flag(&mut self.show_hints),
            other => Err(SettingsError::UnknownKey(other.to_string())),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

pub struct SettingsStore {
    persistence: Arc<PersistenceLayer>,
}

impl SettingsStore {
    pub fn new(persistence: Arc<PersistenceLayer>) -> Self {
        Self { persistence }
    }

    /// Stored settings over defaults. Unreadable storage yields the defaults.
    pub async fn get(&self) -> Settings {
        self.persistence
            .load::<Settings>(SETTINGS_KEY)
            .await
            .unwrap_or_default()
    }

    /// Change one setting and persist. Returns the updated settings.
    pub async fn set(&self, key: &str, value: &str) -> Result<Settings, SettingsError> {
        let mut settings = self
            .persistence
            .try_load::<Settings>(SETTINGS_KEY)
            .await?
            .unwrap_or_default();
        settings.apply(key, value)?;
        self.replace(&settings).await?;
        Ok(settings)
    }

    pub async fn replace(&self, settings: &Settings) -> Result<(), StorageError> {
        self.persistence.try_save(SETTINGS_KEY, settings).await
    }

    /// Drop stored settings so the defaults apply again.
    pub async fn reset(&self) -> bool {
        self.persistence.clear(SETTINGS_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_storage::MemoryStore;

    fn store() -> (Arc<MemoryStore>, SettingsStore) {
        let memory = Arc::new(MemoryStore::new());
        let layer = PersistenceLayer::single(memory.clone());
        (memory, SettingsStore::new(Arc::new(layer)))
    }

    #[tokio::test]
    async fn defaults_when_nothing_stored() {
        let (_, store) = store();
        let settings = store.get().await;
        assert_eq!(settings.theme, "system");
        assert!(settings.show_timer);
        assert!(settings.confirm_before_submit);
        assert!(settings.auto_save);
        assert!(!settings.show_hints);
    }

    #[tokio::test]
    async fn partial_document_merges_over_defaults() {
        let (memory, store) = store();
        memory.insert(SETTINGS_KEY, serde_json::json!({"theme": "dark"}));

        let settings = store.get().await;
        assert_eq!(settings.theme, "dark");
        assert!(settings.show_timer);
    }

    #[tokio::test]
    async fn set_persists_and_reset_restores() {
        let (_, store) = store();
        store.set("show_hints", "yes").await.unwrap();
        store.set("theme", "Light").await.unwrap();

        let settings = store.get().await;
        assert!(settings.show_hints);
        assert_eq!(settings.theme, "light");

        assert!(store.reset().await);
        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn invalid_changes_are_rejected() {
        let (_, store) = store();
        assert!(matches!(
            store.set("volume", "11").await,
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(
            store.set("auto_save", "maybe").await,
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.set("theme", "neon").await,
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn set_does_not_overwrite_unreadable_settings() {
        let (memory, store) = store();
        store.set("theme", "dark").await.unwrap();

        memory.set_fail_loads(true);
        assert!(matches!(
            store.set("show_hints", "true").await,
            Err(SettingsError::Storage(_))
        ));

        memory.set_fail_loads(false);
        let settings = store.get().await;
        assert_eq!(settings.theme, "dark");
        assert!(!settings.show_hints);
    }
}
