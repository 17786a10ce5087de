//! The `examforge export` and `examforge import` commands.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::AppContext;

pub async fn export(output: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let document = ctx.stores.export().await;
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(&output, json)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Exported {} attempt(s) and {} bookmark(s) to {}",
        document.attempts.len(),
        document.bookmarks.len(),
        output.display()
    );
    Ok(())
}

pub async fn import(input: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let json = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let summary = ctx
        .stores
        .import_json(&json)
        .await
        .with_context(|| format!("failed to import {}", input.display()))?;

    println!(
        "Imported {} attempt(s), {} bookmark(s){}",
        summary.attempts,
        summary.bookmarks,
        if summary.settings { " and settings" } else { "" }
    );
    if summary.skipped > 0 {
        println!("Skipped {} malformed entries.", summary.skipped);
    }
    Ok(())
}
