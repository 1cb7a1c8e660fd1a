//! Search service: the immutable context built once at startup and shared by
//! every request handler.

use anyhow::{anyhow, Context};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::Catalog;
use crate::config::{EmbeddingBackend, EmbeddingConfig, QueryTubeConfig};
use crate::embeddings::download::ensure_model;
use crate::embeddings::{
    CachedEmbeddings, EmbeddingModel, HashingEmbeddings, OnnxConfig, OnnxEmbeddings,
};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::presentation::{render_results, status_for_results, ResultCard, STATUS_WAITING};
use crate::ranker::SimilarityRanker;
use crate::types::ScoredVideo;

/// What the UI shows after one submission.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: String,
    pub results_html: String,
    pub cards: Vec<ResultCard>,
    pub error: Option<SearchError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub catalog_rows: usize,
    pub indexed: usize,
    pub dropped: usize,
    pub dimension: usize,
    pub model: String,
}

pub struct SearchService {
    ranker: SimilarityRanker,
    config: QueryTubeConfig,
    catalog_rows: usize,
}

impl SearchService {
    /// Load the catalog, bring up the embedding backend and embed every
    /// description. Any failure here is fatal for the process.
    pub async fn initialize(config: QueryTubeConfig) -> Result<Self, SearchError> {
        config.validate().map_err(SearchError::Initialization)?;
        let started = Instant::now();

        let catalog = Catalog::from_path(&config.catalog.path)
            .map_err(|e| SearchError::initialization(format!("{:#}", e)))?;
        let model = load_embedding_model(&config.embedding)
            .await
            .map_err(|e| SearchError::initialization(format!("{:#}", e)))?;

        let service = tokio::task::spawn_blocking(move || Self::new(config, catalog, model))
            .await
            .map_err(SearchError::initialization)??;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search service ready"
        );
        Ok(service)
    }

    /// Build synchronously from an already loaded catalog and model.
    pub fn new(
        config: QueryTubeConfig,
        catalog: Catalog,
        model: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, SearchError> {
        let catalog_rows = catalog.len();
        let index = SearchIndex::build(catalog, model.as_ref())?;
        Ok(Self {
            ranker: SimilarityRanker::new(Arc::new(index), model),
            config,
            catalog_rows,
        })
    }

    pub fn config(&self) -> &QueryTubeConfig {
        &self.config
    }

    pub fn ranker(&self) -> &SimilarityRanker {
        &self.ranker
    }

    /// Rank with `k` clamped to the configured maximum; `None` uses the default.
    pub fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredVideo>, SearchError> {
        let k = k
            .unwrap_or(self.config.search.default_k)
            .min(self.config.search.max_k);
        self.ranker.rank(query, k)
    }

    pub fn cards(&self, results: &[ScoredVideo]) -> Vec<ResultCard> {
        results
            .iter()
            .map(|r| ResultCard::from_scored(r, self.config.search.snippet_chars))
            .collect()
    }

    /// Handle one UI submission. All-or-nothing: a failed query shows no results.
    pub fn respond(&self, query: &str) -> SearchOutcome {
        match self.search(query, None) {
            Ok(results) => {
                let cards = self.cards(&results);
                SearchOutcome {
                    status: status_for_results(cards.len()),
                    results_html: render_results(
                        query.trim(),
                        &cards,
                        &self.config.catalog.channel_name,
                    ),
                    cards,
                    error: None,
                }
            }
            Err(SearchError::EmptyQuery) => SearchOutcome {
                status: STATUS_WAITING.to_string(),
                results_html: format!(
                    "<p class='prompt'>{}</p>",
                    SearchError::EmptyQuery.user_message()
                ),
                cards: Vec::new(),
                error: Some(SearchError::EmptyQuery),
            },
            Err(e) => {
                tracing::warn!(query = query, error = %e, "Search failed");
                SearchOutcome {
                    status: e.user_message().to_string(),
                    results_html: String::new(),
                    cards: Vec::new(),
                    error: Some(e),
                }
            }
        }
    }

    pub fn stats(&self) -> ServiceStats {
        let index = self.ranker.index();
        ServiceStats {
            catalog_rows: self.catalog_rows,
            indexed: index.len(),
            dropped: index.dropped(),
            dimension: index.dimension(),
            model: self.ranker.model().name().to_string(),
        }
    }
}

/// Construct the configured backend wrapped in the query cache.
pub async fn load_embedding_model(
    config: &EmbeddingConfig,
) -> anyhow::Result<Arc<dyn EmbeddingModel>> {
    let base: Arc<dyn EmbeddingModel> = match config.backend {
        EmbeddingBackend::Hashing => {
            tracing::info!(dimension = config.dimension, "Using feature-hashing embeddings");
            Arc::new(HashingEmbeddings::new(config.dimension))
        }
        EmbeddingBackend::Onnx => {
            let detect =
                || OnnxConfig::auto_detect(&config.model_dir, config.dimension, config.max_length);
            let onnx_config = match detect() {
                Some(found) => Some(found),
                None if config.auto_download => {
                    ensure_model(&config.model_dir)
                        .await
                        .context("Failed to fetch embedding model")?;
                    detect()
                }
                None => None,
            }
            .ok_or_else(|| {
                anyhow!(
                    "No embedding model available. Place the ONNX model in: {}",
                    config.model_dir.display()
                )
            })?;
            let model = tokio::task::spawn_blocking(move || OnnxEmbeddings::new(onnx_config))
                .await
                .context("Model loading task panicked")?
                .context("Failed to load ONNX embeddings")?;
            Arc::new(model)
        }
    };

    Ok(Arc::new(CachedEmbeddings::new(base, config.query_cache_size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VideoRecord;
    use anyhow::Result;
    use std::path::PathBuf;

    struct BrokenQueries {
        inner: HashingEmbeddings,
    }

    impl EmbeddingModel for BrokenQueries {
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("model timed out"))
        }

        fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed_document(text)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn catalog(n: usize) -> Catalog {
        Catalog::from_records(
            (0..n)
                .map(|i| {
                    VideoRecord::new(
                        format!("vid{}", i),
                        format!("Video {}", i),
                        format!("space video number {} about planets", i),
                    )
                })
                .collect(),
        )
    }

    fn hashing_config() -> QueryTubeConfig {
        let mut config = QueryTubeConfig::default();
        config.embedding.backend = EmbeddingBackend::Hashing;
        config.embedding.dimension = 256;
        config
    }

    fn service(n: usize) -> SearchService {
        let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbeddings::new(256));
        SearchService::new(hashing_config(), catalog(n), model).unwrap()
    }

    #[test]
    fn test_respond_shows_at_most_five_cards() {
        let outcome = service(8).respond("planets");
        assert_eq!(outcome.cards.len(), 5);
        assert_eq!(outcome.status, "Displaying Top 5 Results.");
        assert_eq!(outcome.results_html.matches("<iframe").count(), 5);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_respond_with_small_catalog_hides_unused_slots() {
        let outcome = service(2).respond("planets");
        assert_eq!(outcome.cards.len(), 2);
        assert_eq!(outcome.results_html.matches("<iframe").count(), 2);
    }

    #[test]
    fn test_blank_query_prompts_without_ranking() {
        let outcome = service(3).respond("   ");
        assert_eq!(outcome.error, Some(SearchError::EmptyQuery));
        assert_eq!(outcome.status, STATUS_WAITING);
        assert!(outcome.results_html.contains("Please enter a valid search query."));
        assert!(outcome.cards.is_empty());
    }

    #[test]
    fn test_embedding_failure_returns_no_partial_results() {
        let model: Arc<dyn EmbeddingModel> = Arc::new(BrokenQueries {
            inner: HashingEmbeddings::new(256),
        });
        let service = SearchService::new(hashing_config(), catalog(3), model).unwrap();
        let outcome = service.respond("planets");
        assert!(matches!(outcome.error, Some(SearchError::EmbeddingUnavailable(_))));
        assert_eq!(outcome.status, "Search unavailable, please try again.");
        assert!(outcome.cards.is_empty());
        assert!(outcome.results_html.is_empty());
    }

    #[test]
    fn test_search_clamps_k_to_max() {
        let service = service(10);
        assert_eq!(service.search("planets", Some(50)).unwrap().len(), 5);
        assert_eq!(service.search("planets", Some(2)).unwrap().len(), 2);
        assert_eq!(service.search("planets", None).unwrap().len(), 5);
    }

    #[test]
    fn test_stats_report_index_shape() {
        let stats = service(4).stats();
        assert_eq!(stats.catalog_rows, 4);
        assert_eq!(stats.indexed, 4);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.dimension, 256);
        assert_eq!(stats.model, "feature-hashing");
    }

    #[tokio::test]
    async fn test_initialize_missing_catalog_is_fatal() {
        let mut config = hashing_config();
        config.catalog.path = PathBuf::from("/nonexistent/app_data.csv");
        let err = SearchService::initialize(config).await.err().unwrap();
        assert!(matches!(err, SearchError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_initialize_from_csv_with_hashing_backend() {
        let path = std::env::temp_dir().join(format!(
            "querytube-service-{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "video_id,title,description\n\
             a,Black Holes,black holes and gravity\n\
             b,Big Bang,the history of the universe\n\
             c,Vaccines,how vaccines work\n",
        )
        .unwrap();

        let mut config = hashing_config();
        config.catalog.path = path.clone();
        let service = SearchService::initialize(config).await.unwrap();
        std::fs::remove_file(&path).ok();

        let results = service.search("what happens inside a black hole", None).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].record.video_id, "a");
        assert_eq!(service.stats().model, "feature-hashing");
    }

    #[tokio::test]
    async fn test_onnx_backend_without_model_is_fatal() {
        let mut config = QueryTubeConfig::default().embedding;
        config.auto_download = false;
        config.model_dir = PathBuf::from("/nonexistent/models");
        assert!(load_embedding_model(&config).await.is_err());
    }
}
