//! Layered configuration: compiled defaults → `ptolemies.toml` → environment
//! variables → CLI flags (applied by the caller after [`EngineConfig::load`]
//! returns). Later layers win, mirroring the config hierarchy this engine's
//! security-policy ancestor used (defaults → file → env → request-level).

use crate::model::{Category, CrawlPolicy, Priority};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {key} could not be parsed: {message}")]
    EnvParse { key: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub seed_url: String,
    pub category: Category,
    pub priority: Priority,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    pub user_agent: Option<String>,
}

fn default_max_depth() -> u32 {
    3
}
fn default_max_pages() -> u32 {
    500
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}

impl SourceConfig {
    pub fn crawl_policy(&self) -> CrawlPolicy {
        CrawlPolicy {
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            delay_ms: self.delay_ms,
            respect_robots: self.respect_robots,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Tunables that the spec calls out as "configuration, not code": chunking
/// bounds, quality threshold, embedder batch size, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
    #[serde(default = "default_topics_k")]
    pub topics_k: usize,
    #[serde(default = "default_batch_max")]
    pub batch_max: usize,
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
    #[serde(default = "default_embed_parallelism")]
    pub embed_parallelism: usize,
    #[serde(default = "default_stage_capacity")]
    pub stage_queue_capacity: usize,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every_n_urls: usize,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

fn default_max_chars() -> usize {
    1200
}
fn default_min_chars() -> usize {
    100
}
fn default_min_quality() -> f64 {
    0.5
}
fn default_topics_k() -> usize {
    8
}
fn default_batch_max() -> usize {
    100
}
fn default_concurrent_requests() -> usize {
    5
}
fn default_embed_parallelism() -> usize {
    2
}
fn default_stage_capacity() -> usize {
    64
}
fn default_checkpoint_every() -> usize {
    10
}
fn default_embedding_dimension() -> usize {
    1536
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_chars: default_min_chars(),
            min_quality: default_min_quality(),
            topics_k: default_topics_k(),
            batch_max: default_batch_max(),
            concurrent_requests: default_concurrent_requests(),
            embed_parallelism: default_embed_parallelism(),
            stage_queue_capacity: default_stage_capacity(),
            checkpoint_every_n_urls: default_checkpoint_every(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub tunables: Tunables,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            tunables: Tunables::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sources: Vec<SourceConfig>,
    pub tunables: Tunables,
    pub embedding_api_key: Option<String>,
    pub vector_store_url: String,
    pub graph_store_url: String,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub log_level: String,
}

impl EngineConfig {
    /// Loads `defaults -> file -> env` in that order; CLI flags are the
    /// caller's responsibility to apply on top of the returned value.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let file_config = match config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => FileConfig::default(),
        };

        Ok(Self {
            sources: file_config.sources,
            tunables: file_config.tunables,
            embedding_api_key: std::env::var("EMBEDDING_API_KEY").ok(),
            vector_store_url: std::env::var("VECTOR_STORE_URL")
                .unwrap_or_else(|_| "sqlite://ptolemies-vectors.db".to_string()),
            graph_store_url: std::env::var("GRAPH_STORE_URL")
                .unwrap_or_else(|_| "sqlite://ptolemies-graph.db".to_string()),
            state_dir: std::env::var("STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("state")),
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Absent `EMBEDDING_API_KEY` runs the engine in "graph-only" mode per §6.
    pub fn graph_only(&self) -> bool {
        self.embedding_api_key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_no_file_given() {
        let cfg = EngineConfig::load(None).unwrap();
        assert!(cfg.sources.is_empty());
        assert_eq!(cfg.tunables.max_chars, 1200);
    }

    #[test]
    fn parses_sources_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
            [[sources]]
            source_id = "fastapi"
            display_name = "FastAPI"
            seed_url = "https://fastapi.tiangolo.com/"
            category = "backend"
            priority = "high"
            "#
        )
        .unwrap();
        let cfg = EngineConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].source_id, "fastapi");
        assert_eq!(cfg.sources[0].max_depth, 3);
    }
}
