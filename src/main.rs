use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use risonanza::catalog::HttpCatalogClient;
use risonanza::config::{AppConfig, CliConfig, FileConfig};
use risonanza::embedding::{EmbeddingExtractor, HttpEmbeddingExtractor, UnavailableExtractor};
use risonanza::engine::{RecommendationService, Recommender};
use risonanza::explain::TemplateExplainer;
use risonanza::server::{run_server, ServerState};
use risonanza::store::VectorStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the corpus artifacts (vector table + metadata).
    #[clap(long, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Optional TOML config file; values in it override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Attribute vector dimension (A).
    #[clap(long, default_value_t = 128)]
    pub attribute_dim: usize,

    /// Audio embedding vector dimension (E).
    #[clap(long, default_value_t = 128)]
    pub embedding_dim: usize,

    /// Base URL of the upstream catalog service.
    #[clap(long)]
    pub catalog_url: Option<String>,

    /// Base URL of the audio embedding service. When absent, ingestion runs
    /// in degraded mode (zero embeddings).
    #[clap(long)]
    pub embedding_url: Option<String>,

    /// Timeout in seconds for upstream catalog and embedding requests.
    #[clap(long, default_value_t = 10)]
    pub upstream_timeout_sec: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        data_dir: cli_args.data_dir.clone(),
        port: cli_args.port,
        attribute_dim: cli_args.attribute_dim,
        embedding_dim: cli_args.embedding_dim,
        catalog_url: cli_args.catalog_url.clone(),
        embedding_url: cli_args.embedding_url.clone(),
        upstream_timeout_secs: cli_args.upstream_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!(
        "Starting with A={} E={} (combined {}), data dir {:?}",
        config.attribute_dim,
        config.embedding_dim,
        config.combined_dim(),
        config.data_dir
    );

    let store = VectorStore::load_or_seed(&config.data_dir, config.combined_dim())
        .context("Could not initialize the vector store")?;
    let recommender = Recommender::new(store, config.attribute_dim, config.embedding_dim);

    let catalog = Arc::new(
        HttpCatalogClient::new(&config.catalog_url, config.upstream_timeout)
            .context("Could not build the catalog client")?,
    );

    let embedder: Arc<dyn EmbeddingExtractor> = match &config.embedding_url {
        Some(url) => Arc::new(
            HttpEmbeddingExtractor::new(url, config.upstream_timeout)
                .context("Could not build the embedding client")?,
        ),
        None => {
            warn!("No embedding service configured; all ingestion will run in degraded mode");
            Arc::new(UnavailableExtractor)
        }
    };

    let service = Arc::new(RecommendationService::new(
        recommender,
        catalog,
        embedder,
        config.data_dir.clone(),
    ));

    let state = ServerState {
        service,
        explainer: Arc::new(TemplateExplainer),
        start_time: Instant::now(),
    };

    run_server(state, config.port).await
}
