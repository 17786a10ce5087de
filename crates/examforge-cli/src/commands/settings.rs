//! The `examforge settings` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use examforge_history::Settings;

use super::AppContext;

pub async fn execute(set: Option<String>, reset: bool, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let store = &ctx.stores.settings;

    let settings = if reset {
        anyhow::ensure!(store.reset().await, "failed to reset settings");
        println!("Settings reset to defaults.");
        store.get().await
    } else if let Some(assignment) = set {
        let (key, value) = assignment
            .split_once('=')
            .context("expected KEY=VALUE, e.g. theme=dark")?;
        let settings = store.set(key.trim(), value.trim()).await?;
        println!("Updated {}.", key.trim());
        settings
    } else {
        store.get().await
    };

    print_settings(&settings);
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("theme = {}", settings.theme);
    println!("show_timer = {}", settings.show_timer);
    println!("confirm_before_submit = {}", settings.confirm_before_submit);
    println!("auto_save = {}", settings.auto_save);
    println!("show_hints = {}", settings.show_hints);
}
