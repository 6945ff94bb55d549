use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::graph::{BuildEdgesConfig, MirrorWeight};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EmbConfig {
    pub log: LogConfig,
    pub graph: GraphConfig,
    pub index: IndexConfig,
    pub metric: MetricConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

/// Defaults for `emb edges` flags.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    pub edge_type: String,
    pub directed: bool,
    pub min_similarity: Option<f64>,
    pub top_k: Option<usize>,
    pub mirror: MirrorWeight,
    pub parallel: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// `flat`, `ivf` or `sqlite-vec`.
    pub backend: String,
    pub dimension: usize,
    /// `ip` or `l2`.
    pub metric: String,
    pub nlist: usize,
    pub nprobe: usize,
    /// sqlite-vec database file. Empty means in-memory.
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricConfig {
    /// `lexical`, `cosine`, `dot` or `temporal`.
    pub kind: String,
    /// Fields read by the lexical metric; empty reads all node text.
    pub lexical_fields: Vec<String>,
    pub temporal_half_life_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_type: "similar".into(),
            directed: false,
            min_similarity: None,
            top_k: None,
            mirror: MirrorWeight::Forward,
            parallel: false,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: "flat".into(),
            dimension: 384,
            metric: "ip".into(),
            nlist: 16,
            nprobe: 4,
            db_path: String::new(),
        }
    }
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            kind: "cosine".into(),
            lexical_fields: Vec::new(),
            temporal_half_life_secs: 86_400,
        }
    }
}

impl GraphConfig {
    pub fn to_build_config(&self) -> BuildEdgesConfig {
        BuildEdgesConfig {
            edge_type: self.edge_type.clone(),
            directed: self.directed,
            min_similarity: self.min_similarity,
            top_k: self.top_k,
            mirror: self.mirror,
            parallel: self.parallel,
        }
    }
}

impl IndexConfig {
    /// The sqlite-vec database path with `~` expanded, or `None` for in-memory.
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        if self.db_path.trim().is_empty() {
            None
        } else {
            Some(expand_tilde(&self.db_path))
        }
    }
}

/// Returns `~/.emb/`
pub fn default_emb_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".emb")
}

/// Returns the default config file path: `~/.emb/config.toml`
pub fn default_config_path() -> PathBuf {
    default_emb_dir().join("config.toml")
}

impl EmbConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EmbConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (EMB_LOG_LEVEL, EMB_INDEX_BACKEND, EMB_INDEX_DB).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("EMB_LOG_LEVEL") {
            self.log.level = val;
        }
        if let Ok(val) = std::env::var("EMB_INDEX_BACKEND") {
            self.index.backend = val;
        }
        if let Ok(val) = std::env::var("EMB_INDEX_DB") {
            self.index.db_path = val;
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
