//! Optional TOML file configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// All fields optional; anything present overrides the CLI value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<String>,
    pub port: Option<u16>,
    pub attribute_dim: Option<usize>,
    pub embedding_dim: Option<usize>,
    pub catalog_url: Option<String>,
    pub embedding_url: Option<String>,
    pub upstream_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}
