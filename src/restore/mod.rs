// dumptool/src/restore/mod.rs
use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::load::run_load;
use crate::runner::TokioProcessRunner;

/// Public entry point for the restore process.
///
/// `directory` selects the dump to load; it defaults to `loader.directory`.
pub async fn run_restore_flow(app_config: &AppConfig, directory: Option<&str>) -> Result<()> {
    let load_config = app_config.load_config(directory)?;
    if !std::path::Path::new(load_config.directory()).is_dir() {
        anyhow::bail!("Restore directory {} does not exist", load_config.directory());
    }
    info!(directory = load_config.directory(), "Restoring dump");

    run_load(&load_config, &TokioProcessRunner::new())
        .await
        .with_context(|| format!("Failed to load dump from {}", load_config.directory()))?;
    Ok(())
}
