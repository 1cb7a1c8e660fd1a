use anyhow::{anyhow, Result};
use clap::Parser;
use querytube::config::EmbeddingBackend;
use querytube::QueryTubeConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "querytube-web",
    about = "Semantic search UI for a YouTube channel's videos"
)]
pub struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long, env = "QUERYTUBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// CSV catalog with video_id, title and description columns.
    #[arg(long, env = "QUERYTUBE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Directory holding (or receiving) the ONNX model.
    #[arg(long, env = "MODEL_PATH")]
    pub model_dir: Option<PathBuf>,

    /// Embedding backend: `onnx` or `hashing`.
    #[arg(long, env = "QUERYTUBE_BACKEND")]
    pub backend: Option<EmbeddingBackend>,

    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "QUERYTUBE_BIND")]
    pub bind: Option<String>,

    /// Never fetch model files from HuggingFace.
    #[arg(long)]
    pub no_download: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<QueryTubeConfig> {
        let mut config = match &self.config {
            Some(path) => QueryTubeConfig::from_file(path).map_err(|e| anyhow!(e))?,
            None => QueryTubeConfig::default(),
        };

        if let Some(catalog) = &self.catalog {
            config.catalog.path = catalog.clone();
        }
        if let Some(model_dir) = &self.model_dir {
            config.embedding.model_dir = model_dir.clone();
        }
        if let Some(backend) = self.backend {
            config.embedding.backend = backend;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if self.no_download {
            config.embedding.auto_download = false;
        }

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "querytube-web",
            "--catalog",
            "videos.csv",
            "--backend",
            "hashing",
            "--bind",
            "0.0.0.0:9000",
            "--no-download",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.catalog.path, PathBuf::from("videos.csv"));
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(!config.embedding.auto_download);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["querytube-web", "--backend", "bert"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("querytube-cli-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "catalog": { "path": "from_file.csv", "channel_name": "Veritasium" } }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "querytube-web",
            "--config",
            path.to_str().unwrap(),
            "--catalog",
            "from_flag.csv",
        ])
        .unwrap();
        let config = cli.resolve_config();
        std::fs::remove_file(&path).ok();

        let config = config.unwrap();
        assert_eq!(config.catalog.path, PathBuf::from("from_flag.csv"));
        assert_eq!(config.catalog.channel_name, "Veritasium");
    }
}
