use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use super::EmbeddingModel;

/// Memoizes query embeddings so repeated searches skip inference.
/// Passage embeddings pass straight through; they are computed once at startup.
pub struct CachedEmbeddings<M> {
    inner: M,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl<M: EmbeddingModel> CachedEmbeddings<M> {
    /// `capacity == 0` disables caching.
    pub fn new(inner: M, capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner, cache }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }
}

impl<M: EmbeddingModel> EmbeddingModel for CachedEmbeddings<M> {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let Some(cache) = &self.cache else {
            return self.inner.embed_query(text);
        };

        if let Some(hit) = cache.lock().get(text) {
            return Ok(hit.clone());
        }

        // Lock is released during inference; two racing misses both compute.
        let embedding = self.inner.embed_query(text)?;
        cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_document(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
