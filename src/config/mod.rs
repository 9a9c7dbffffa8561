mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments relevant to config resolution, mirroring the flags that a
/// TOML config file may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    pub attribute_dim: usize,
    pub embedding_dim: usize,
    pub catalog_url: Option<String>,
    pub embedding_url: Option<String>,
    pub upstream_timeout_secs: u64,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the paired corpus artifacts.
    pub data_dir: PathBuf,
    pub port: u16,
    /// Attribute vector dimension `A`.
    pub attribute_dim: usize,
    /// Embedding vector dimension `E`.
    pub embedding_dim: usize,
    /// Base URL of the upstream catalog service.
    pub catalog_url: String,
    /// Base URL of the embedding service; absent means every ingest runs in
    /// degraded mode.
    pub embedding_url: Option<String>,
    /// Timeout applied to both upstream HTTP clients.
    pub upstream_timeout: Duration,
}

impl AppConfig {
    /// Resolve from CLI arguments and an optional TOML file config. File
    /// values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in the config file")
            })?;

        let port = file.port.unwrap_or(cli.port);
        let attribute_dim = file.attribute_dim.unwrap_or(cli.attribute_dim);
        let embedding_dim = file.embedding_dim.unwrap_or(cli.embedding_dim);

        if attribute_dim == 0 {
            bail!("attribute_dim must be positive");
        }
        if embedding_dim == 0 {
            bail!("embedding_dim must be positive");
        }

        let catalog_url = file
            .catalog_url
            .or_else(|| cli.catalog_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "catalog_url must be specified via --catalog-url or in the config file"
                )
            })?;

        let embedding_url = file.embedding_url.or_else(|| cli.embedding_url.clone());
        let upstream_timeout_secs = file
            .upstream_timeout_secs
            .unwrap_or(cli.upstream_timeout_secs);

        Ok(Self {
            data_dir,
            port,
            attribute_dim,
            embedding_dim,
            catalog_url,
            embedding_url,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
        })
    }

    /// Dimension of the stored combined vectors, `A + E`.
    pub fn combined_dim(&self) -> usize {
        self.attribute_dim + self.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliConfig {
        CliConfig {
            data_dir: Some(PathBuf::from("/tmp/data")),
            port: 3001,
            attribute_dim: 128,
            embedding_dim: 128,
            catalog_url: Some("http://catalog:8000".to_string()),
            embedding_url: None,
            upstream_timeout_secs: 10,
        }
    }

    #[test]
    fn test_resolve_from_cli_only() {
        let config = AppConfig::resolve(&cli(), None).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.combined_dim(), 256);
        assert_eq!(config.catalog_url, "http://catalog:8000");
        assert!(config.embedding_url.is_none());
    }

    #[test]
    fn test_file_overrides_cli() {
        let file = FileConfig {
            port: Some(9000),
            embedding_dim: Some(64),
            embedding_url: Some("http://embedder:7000".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli(), Some(file)).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.embedding_dim, 64);
        assert_eq!(config.combined_dim(), 192);
        assert_eq!(config.embedding_url.as_deref(), Some("http://embedder:7000"));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let file = FileConfig {
            attribute_dim: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli(), Some(file)).is_err());
    }

    #[test]
    fn test_missing_data_dir_rejected() {
        let mut args = cli();
        args.data_dir = None;
        assert!(AppConfig::resolve(&args, None).is_err());
    }

    #[test]
    fn test_missing_catalog_url_rejected() {
        let mut args = cli();
        args.catalog_url = None;
        assert!(AppConfig::resolve(&args, None).is_err());
    }
}
