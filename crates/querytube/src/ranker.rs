use std::sync::Arc;

use crate::embeddings::{check_vector, EmbeddingModel};
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::types::ScoredVideo;

/// Ranks the shared, read-only index against free-text queries.
///
/// Every call is independent: one query embedding, one dot product against
/// the matrix, a stable sort. Nothing is written, so clones can serve
/// concurrent requests.
#[derive(Clone)]
pub struct SimilarityRanker {
    index: Arc<SearchIndex>,
    model: Arc<dyn EmbeddingModel>,
}

impl SimilarityRanker {
    pub fn new(index: Arc<SearchIndex>, model: Arc<dyn EmbeddingModel>) -> Self {
        Self { index, model }
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn model(&self) -> &dyn EmbeddingModel {
        self.model.as_ref()
    }

    /// Top `k` catalog rows for `query`, highest dot product first.
    ///
    /// Returns `min(k, N)` results. Ties keep catalog order.
    pub fn rank(&self, query: &str, k: usize) -> Result<Vec<ScoredVideo>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .model
            .embed_query(query)
            .map_err(SearchError::embedding)?;
        check_vector(&query_vector, self.index.dimension()).map_err(SearchError::embedding)?;

        let scores = self
            .index
            .scores(&query_vector)
            .map_err(SearchError::embedding)?;
        // Finite vectors can still overflow to inf or inf - inf = NaN.
        if let Some(row) = scores.iter().position(|s| !s.is_finite()) {
            return Err(SearchError::embedding(format!(
                "non-finite similarity score for catalog row {}",
                row
            )));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        // sort_by is stable, so equal scores stay in catalog order.
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);

        let results: Vec<ScoredVideo> = order
            .into_iter()
            .filter_map(|row| {
                self.index.record(row).map(|record| ScoredVideo {
                    record: record.clone(),
                    score: scores[row],
                })
            })
            .collect();

        tracing::debug!(
            query = query,
            results = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            "Ranked query"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::embeddings::HashingEmbeddings;
    use crate::types::VideoRecord;
    use anyhow::{anyhow, Result};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn scenario_catalog() -> Catalog {
        Catalog::from_records(vec![
            VideoRecord::new("a", "Black Holes", "black holes and gravity"),
            VideoRecord::new("b", "Big Bang", "the history of the universe"),
            VideoRecord::new("c", "Vaccines", "how vaccines work"),
        ])
    }

    fn hashing_ranker(catalog: Catalog) -> SimilarityRanker {
        let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbeddings::new(512));
        let index = SearchIndex::build(catalog, model.as_ref()).unwrap();
        SimilarityRanker::new(Arc::new(index), model)
    }

    /// Returns a fixed query vector and counts calls.
    struct FixedModel {
        query: Vec<f32>,
        calls: AtomicUsize,
    }

    impl EmbeddingModel for FixedModel {
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.query.clone())
        }

        fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.query.clone())
        }

        fn dimension(&self) -> usize {
            self.query.len()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingModel;

    impl EmbeddingModel for FailingModel {
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("inference session crashed"))
        }

        fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("inference session crashed"))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn fixed_ranker(rows: Vec<Vec<f32>>, query: Vec<f32>) -> (SimilarityRanker, Arc<FixedModel>) {
        let dimension = query.len();
        let records = (0..rows.len())
            .map(|i| VideoRecord::new(format!("v{}", i), format!("Video {}", i), "text"))
            .collect();
        let index = SearchIndex::from_parts(records, rows, dimension).unwrap();
        let model = Arc::new(FixedModel {
            query,
            calls: AtomicUsize::new(0),
        });
        let ranker = SimilarityRanker::new(Arc::new(index), model.clone());
        (ranker, model)
    }

    fn ids(results: &[ScoredVideo]) -> Vec<&str> {
        results.iter().map(|r| r.record.video_id.as_str()).collect()
    }

    #[test]
    fn test_black_hole_query_ranks_black_hole_video_first() {
        let ranker = hashing_ranker(scenario_catalog());
        let results = ranker.rank("what happens inside a black hole", 5).unwrap();
        assert_eq!(results[0].record.video_id, "a");
    }

    #[test]
    fn test_result_length_is_min_of_k_and_catalog_size() {
        let ranker = hashing_ranker(scenario_catalog());
        for k in 0..6 {
            let results = ranker.rank("universe", k).unwrap();
            assert_eq!(results.len(), k.min(3));
        }
    }

    #[test]
    fn test_scores_are_non_increasing_and_ids_unique() {
        let ranker = hashing_ranker(scenario_catalog());
        let results = ranker.rank("how does gravity shape the universe", 5).unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let unique: HashSet<&str> = ids(&results).into_iter().collect();
        assert_eq!(unique.len(), results.len());
    }

    #[test]
    fn test_identical_description_scores_maximum() {
        let ranker = hashing_ranker(scenario_catalog());
        let results = ranker.rank("the history of the universe", 3).unwrap();
        assert_eq!(results[0].record.video_id, "b");
        assert!(results.iter().all(|r| r.score <= results[0].score));
    }

    #[test]
    fn test_repeated_query_is_idempotent() {
        let ranker = hashing_ranker(scenario_catalog());
        let first = ranker.rank("how vaccines work", 5).unwrap();
        let second = ranker.rank("how vaccines work", 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let (ranker, _) = fixed_ranker(
            vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]],
            vec![1.0, 0.0],
        );
        let results = ranker.rank("anything", 4).unwrap();
        assert_eq!(ids(&results), vec!["v1", "v3", "v0", "v2"]);
    }

    #[test]
    fn test_dot_product_not_cosine() {
        // Cosine would tie these rows; dot product prefers the longer vector.
        let (ranker, _) = fixed_ranker(vec![vec![1.0, 1.0], vec![3.0, 3.0]], vec![1.0, 1.0]);
        let results = ranker.rank("anything", 2).unwrap();
        assert_eq!(ids(&results), vec!["v1", "v0"]);
        assert_eq!(results[0].score, 6.0);
    }

    #[test]
    fn test_blank_query_never_reaches_model() {
        let (ranker, model) = fixed_ranker(vec![vec![1.0, 0.0]], vec![1.0, 0.0]);
        assert_eq!(ranker.rank("   \t\n", 5), Err(SearchError::EmptyQuery));
        assert_eq!(ranker.rank("", 5), Err(SearchError::EmptyQuery));
        assert_eq!(model.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_empty_catalog_returns_empty_result() {
        let ranker = hashing_ranker(Catalog::default());
        assert!(ranker.rank("black holes", 5).unwrap().is_empty());
    }

    #[test]
    fn test_model_failure_is_embedding_unavailable() {
        let records = vec![VideoRecord::new("a", "A", "x")];
        let index = SearchIndex::from_parts(records, vec![vec![1.0, 0.0]], 2).unwrap();
        let ranker = SimilarityRanker::new(Arc::new(index), Arc::new(FailingModel));
        let err = ranker.rank("black holes", 5).unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_overflowing_scores_are_embedding_unavailable() {
        // Every component is finite, but row v1 scores inf + -inf = NaN.
        let (ranker, _) = fixed_ranker(
            vec![vec![1.0, 0.0], vec![f32::MAX, -f32::MAX], vec![2.0, 0.0]],
            vec![2.0, 2.0],
        );
        assert!(matches!(
            ranker.rank("anything", 3),
            Err(SearchError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn test_highest_score_ranks_first() {
        let (ranker, _) = fixed_ranker(
            vec![vec![1.0, 0.0], vec![-3.0, 0.0], vec![2.0, 0.0]],
            vec![2.0, 2.0],
        );
        let results = ranker.rank("anything", 3).unwrap();
        assert_eq!(ids(&results), vec!["v2", "v0", "v1"]);
        assert_eq!(results[0].score, 4.0);
    }

    #[test]
    fn test_malformed_query_vector_is_embedding_unavailable() {
        let (zero, _) = fixed_ranker(vec![vec![1.0, 0.0]], vec![0.0, 0.0]);
        assert!(matches!(
            zero.rank("q", 1),
            Err(SearchError::EmbeddingUnavailable(_))
        ));

        let (nan, _) = fixed_ranker(vec![vec![1.0, 0.0]], vec![f32::NAN, 1.0]);
        assert!(matches!(
            nan.rank("q", 1),
            Err(SearchError::EmbeddingUnavailable(_))
        ));
    }
}
