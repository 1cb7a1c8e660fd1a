pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod presentation;
pub mod ranker;
pub mod service;
pub mod types;

// Re-export primary types for convenience
pub use catalog::Catalog;
pub use config::QueryTubeConfig;
pub use error::SearchError;
pub use index::SearchIndex;
pub use ranker::SimilarityRanker;
pub use service::{SearchOutcome, SearchService, ServiceStats};
pub use types::{ScoredVideo, VideoRecord};

// Re-export embedding backends
pub use embeddings::{CachedEmbeddings, EmbeddingModel, HashingEmbeddings, OnnxEmbeddings};

// Re-export common types
pub use anyhow::{Error, Result};
