//! Configuration file location and loading.

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use netfast_agent::AgentConfig;
use std::path::{Path, PathBuf};

/// Default config file path.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("app", "netfast", "netfast")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join("config.toml"))
}

/// Resolve `--config`, falling back to the default location.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_path(),
    }
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load(path: &Path) -> Result<AgentConfig> {
    let mut config = AgentConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(state_path) = &config.state_path {
        let expanded = shellexpand::tilde(&state_path.to_string_lossy()).into_owned();
        config.state_path = Some(PathBuf::from(expanded));
    }

    Ok(config)
}

/// Save configuration to `path`.
pub fn save(config: &AgentConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}
