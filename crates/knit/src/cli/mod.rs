//! CLI command implementations.

pub mod apply;
pub mod id;
pub mod resolve;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use knit::Config;

/// Load the configuration named by `--config`, or the default file if it
/// exists.
pub async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let root = std::env::current_dir().context("failed to get current directory")?;
            let path = Config::default_path(&root);
            Config::load_or_default(&path)
                .await
                .with_context(|| format!("failed to load config {}", path.display()))
        }
    }
}

/// The graph database to use: `--db`, else the configured path.
pub fn database_path(config: &Config, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| config.storage.database.clone(), Path::to_path_buf)
}
