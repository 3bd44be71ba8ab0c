//! Initialize the configuration directory: create `~/.lifebot` and a default `config.json`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Fail unless `lifebot init` has created the config file.
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `lifebot init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Default config written by `lifebot init`: every field with its default value, so the file
/// doubles as documentation. Secrets are left empty; env vars are the preferred source.
pub fn default_config_json() -> Result<String> {
    serde_json::to_string_pretty(&Config::default()).context("serializing default config")
}

/// Create the config directory and write the default config if it does not exist.
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        std::fs::write(config_path, default_config_json()?)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }
    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_config_once() {
        let dir = std::env::temp_dir().join(format!("lifebot-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        assert!(require_initialized(&path).is_err());

        assert_eq!(init_config_dir(&path).unwrap(), dir);
        require_initialized(&path).unwrap();
        let (config, used) = crate::config::load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.schedule.timezone, "Asia/Seoul");

        std::fs::write(&path, "{\"gateway\":{\"port\":1}}").unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = crate::config::load_config(Some(path)).unwrap();
        assert_eq!(config.gateway.port, 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
