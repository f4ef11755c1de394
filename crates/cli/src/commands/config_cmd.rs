//! `toolweave config`: configuration management commands.

use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use toolweave_config::AppConfig;

use super::load_config;

fn effective_path(config_path: Option<&Path>) -> PathBuf {
    config_path.map_or_else(AppConfig::resolve_path, Path::to_path_buf)
}

pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", effective_path(config_path).display());
    Ok(())
}

pub fn init(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = effective_path(config_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
