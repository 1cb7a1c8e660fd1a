use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Example queries offered under the search box.
pub const DEFAULT_EXAMPLE_QUERIES: &[&str] = &[
    "the fermi paradox",
    "what is the meaning of life",
    "could we live on mars?",
    "the science of aging",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTubeConfig {
    pub catalog: CatalogConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// CSV file with `video_id`, `title`, `description` (and optionally `published_date`) columns.
    pub path: PathBuf,
    /// Channel label shown in each result's meta line.
    pub channel_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// multi-qa-mpnet-base-dot-v1 through ONNX Runtime.
    Onnx,
    /// Feature-hashing model, no weights required.
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "hashing" => Ok(Self::Hashing),
            other => Err(format!(
                "unknown embedding backend '{}' (expected 'onnx' or 'hashing')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub backend: EmbeddingBackend,
    pub dimension: usize,
    pub max_length: usize,
    /// Number of query embeddings kept in the LRU cache (0 disables caching).
    pub query_cache_size: usize,
    /// Fetch missing model files from the HuggingFace hub on startup.
    pub auto_download: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
    /// Description characters shown on a result card before truncation.
    pub snippet_chars: usize,
    pub example_queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl QueryTubeConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.embedding.max_length == 0 {
            return Err("embedding.max_length must be > 0".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if self.search.default_k > self.search.max_k {
            return Err("search.default_k must be <= search.max_k".into());
        }
        if self.search.snippet_chars == 0 {
            return Err("search.snippet_chars must be > 0".into());
        }
        if self.server.bind.trim().is_empty() {
            return Err("server.bind must not be empty".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for QueryTubeConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app_data.csv"),
            channel_name: "Kurzgesagt".to_string(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            backend: EmbeddingBackend::Onnx,
            dimension: 768,
            max_length: 512,
            query_cache_size: 128,
            auto_download: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 5,
            snippet_chars: 150,
            example_queries: DEFAULT_EXAMPLE_QUERIES
                .iter()
                .map(|q| q.to_string())
                .collect(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7860".to_string(),
        }
    }
}

/// `./models` if present, then `MODEL_PATH`, then the per-user data directory.
fn default_model_dir() -> PathBuf {
    if Path::new("models").exists() {
        return PathBuf::from("models");
    }
    if let Ok(env_path) = std::env::var("MODEL_PATH") {
        return PathBuf::from(env_path);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("querytube")
        .join("models")
}
