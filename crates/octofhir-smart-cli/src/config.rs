use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use octofhir_smart_launch::SmartConfig;

fn default_config_path() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".octofhir")
        .join("smart.toml"))
}

/// Config file path: `--config` / `OCTOFHIR_SMART_CONFIG`, else `~/.octofhir/smart.toml`.
pub fn resolve_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}

pub fn load(cli_path: Option<&Path>) -> Result<SmartConfig> {
    let path = resolve_path(cli_path)?;
    tracing::debug!(path = %path.display(), exists = path.exists(), "loading SMART launch config");
    SmartConfig::load(Some(&path))
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
