use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "~/.config/qmd/config.yaml";

/// Environment override for the database file path.
pub const ENV_INDEX_PATH: &str = "QMD_INDEX_PATH";
/// Environment override for the cache root the default path lives under.
pub const ENV_CACHE_HOME: &str = "QMD_CACHE_HOME";
/// Environment override for the LLM provider endpoint.
pub const ENV_LLM_BASE_URL: &str = "QMD_LLM_BASE_URL";

fn default_embed_model() -> String {
    "embeddinggemma".to_string()
}

fn default_query_model() -> String {
    "qwen3:0.6b".to_string()
}

fn default_rerank_model() -> String {
    "qwen3:0.6b".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_chunk_byte_size() -> usize {
    6144
}

fn default_multi_get_max_bytes() -> usize {
    65536
}

fn default_exclude_dirs() -> Vec<String> {
    ["node_modules", ".git", ".cache", "vendor", "dist", "build"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Main configuration. Loaded from `~/.config/qmd/config.yaml` when present,
/// otherwise defaults; the path-shaped fields honor environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model used when none is given to embed / vector search
    #[serde(default = "default_embed_model")]
    pub default_embed_model: String,

    /// Model used for query expansion
    #[serde(default = "default_query_model")]
    pub default_query_model: String,

    /// Model used for reranking
    #[serde(default = "default_rerank_model")]
    pub default_rerank_model: String,

    /// HTTP endpoint of the LLM provider
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// Maximum UTF-8 bytes per chunk
    #[serde(default = "default_chunk_byte_size")]
    pub chunk_byte_size: usize,

    /// Per-file size cap in multi-get; larger files are reported skipped
    #[serde(default = "default_multi_get_max_bytes")]
    pub multi_get_max_bytes: usize,

    /// Directory names excluded from file walking
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_embed_model: default_embed_model(),
            default_query_model: default_query_model(),
            default_rerank_model: default_rerank_model(),
            llm_base_url: default_llm_base_url(),
            chunk_byte_size: default_chunk_byte_size(),
            multi_get_max_bytes: default_multi_get_max_bytes(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

impl Config {
    /// Load configuration from the default path or fall back to defaults.
    pub fn load() -> Result<Self, anyhow::Error> {
        let config_path = expand_path(DEFAULT_CONFIG_PATH);

        let mut config = if config_path.exists() {
            info!("Loading configuration from: {:?}", config_path);
            let content = fs::read_to_string(&config_path)?;
            serde_yaml::from_str::<Config>(&content)?
        } else {
            info!("Configuration not found, using defaults");
            Self::default()
        };

        if let Ok(url) = std::env::var(ENV_LLM_BASE_URL) {
            config.llm_base_url = url;
        }

        Ok(config)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), anyhow::Error> {
        let config_path = expand_path(DEFAULT_CONFIG_PATH);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        fs::write(&config_path, content)?;

        info!("Configuration saved to: {:?}", config_path);
        Ok(())
    }

    /// Path of the single database file.
    ///
    /// `QMD_INDEX_PATH` overrides everything; `QMD_CACHE_HOME` overrides
    /// the cache root the default `qmd/index.db` lives under.
    pub fn index_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ENV_INDEX_PATH) {
            return expand_path(&path);
        }
        cache_home().join("qmd").join("index.db")
    }
}

fn cache_home() -> PathBuf {
    if let Ok(home) = std::env::var(ENV_CACHE_HOME) {
        return expand_path(&home);
    }
    dirs::cache_dir().unwrap_or_else(|| expand_path("~/.cache"))
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
