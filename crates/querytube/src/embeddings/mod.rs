pub mod cache;
pub mod download;
pub mod hashing;
pub mod onnx;

pub use cache::CachedEmbeddings;
pub use hashing::HashingEmbeddings;
pub use onnx::{OnnxConfig, OnnxEmbeddings};

use anyhow::{anyhow, Result};

/// Unified embedding model trait
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a catalog passage
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed passages at index build time
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension
    fn dimension(&self) -> usize;

    /// Human-readable model identifier for logs and health output
    fn name(&self) -> &str;
}

impl<M: EmbeddingModel + ?Sized> EmbeddingModel for std::sync::Arc<M> {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_query(text)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_document(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_documents(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Reject vectors a dot product cannot rank meaningfully: wrong length,
/// NaN/infinite components, or all zeros.
pub fn check_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(anyhow!(
            "expected {} dimensions, got {}",
            dimension,
            vector.len()
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("embedding contains non-finite values"));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(anyhow!("embedding is the zero vector"));
    }
    Ok(())
}
