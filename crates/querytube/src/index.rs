//! Catalog/embedding initializer.
//!
//! Produces the aligned (records, matrix) pair once per process. Row `i` of
//! the matrix is the passage embedding of `records[i]`; rows that cannot be
//! embedded are dropped from both sides together.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, ArrayView1};
use std::time::Instant;

use crate::catalog::Catalog;
use crate::embeddings::{check_vector, EmbeddingModel};
use crate::error::SearchError;
use crate::types::VideoRecord;

const BUILD_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct SearchIndex {
    records: Vec<VideoRecord>,
    matrix: Array2<f32>,
    dropped: usize,
}

impl SearchIndex {
    /// Assemble an index from precomputed rows. Lengths and widths must agree.
    pub fn from_parts(
        records: Vec<VideoRecord>,
        vectors: Vec<Vec<f32>>,
        dimension: usize,
    ) -> Result<Self> {
        if records.len() != vectors.len() {
            return Err(anyhow!(
                "catalog has {} rows but {} embeddings",
                records.len(),
                vectors.len()
            ));
        }

        let rows = vectors.len();
        let mut flat = Vec::with_capacity(rows * dimension);
        for (record, vector) in records.iter().zip(&vectors) {
            if vector.len() != dimension {
                return Err(anyhow!(
                    "embedding for {} has {} dimensions, expected {}",
                    record.video_id,
                    vector.len(),
                    dimension
                ));
            }
            flat.extend_from_slice(vector);
        }

        let matrix = Array2::from_shape_vec((rows, dimension), flat)
            .map_err(|e| anyhow!("Failed to shape embedding matrix: {}", e))?;

        Ok(Self {
            records,
            matrix,
            dropped: 0,
        })
    }

    /// Embed every catalog description with `model`. Must complete before
    /// any query is served.
    pub fn build(catalog: Catalog, model: &dyn EmbeddingModel) -> Result<Self, SearchError> {
        let started = Instant::now();
        let dimension = model.dimension();
        let total = catalog.len();
        let records = catalog.into_records();

        let mut kept_records = Vec::with_capacity(total);
        let mut kept_vectors = Vec::with_capacity(total);

        for batch in records.chunks(BUILD_BATCH_SIZE) {
            for (record, outcome) in batch.iter().zip(embed_batch(batch, model)) {
                match outcome.and_then(|v| check_vector(&v, dimension).map(|_| v)) {
                    Ok(vector) => {
                        kept_records.push(record.clone());
                        kept_vectors.push(vector);
                    }
                    Err(e) => {
                        tracing::warn!(
                            video_id = %record.video_id,
                            error = %e,
                            "Dropping catalog row that could not be embedded"
                        );
                    }
                }
            }
        }

        if total > 0 && kept_records.is_empty() {
            return Err(SearchError::Initialization(format!(
                "none of the {} catalog rows could be embedded",
                total
            )));
        }

        let dropped = total - kept_records.len();
        let mut index = Self::from_parts(kept_records, kept_vectors, dimension)
            .map_err(SearchError::initialization)?;
        index.dropped = dropped;

        tracing::info!(
            rows = index.len(),
            dropped,
            dimension,
            model = model.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search index built"
        );

        Ok(index)
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&VideoRecord> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Catalog rows discarded during `build`.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Dot product of `query` against every row, in catalog order.
    pub fn scores(&self, query: &[f32]) -> Result<Array1<f32>> {
        if query.len() != self.dimension() {
            return Err(anyhow!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimension()
            ));
        }
        Ok(self.matrix.dot(&ArrayView1::from(query)))
    }
}

/// Embed one batch; when the batch call fails, retry row by row so a single
/// bad passage only costs its own row.
fn embed_batch(batch: &[VideoRecord], model: &dyn EmbeddingModel) -> Vec<Result<Vec<f32>>> {
    let texts: Vec<&str> = batch.iter().map(|r| r.embedding_text()).collect();

    match model.embed_documents(&texts) {
        Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Ok).collect(),
        Ok(vectors) => {
            tracing::warn!(
                expected = batch.len(),
                got = vectors.len(),
                "Batch embedding returned wrong row count, retrying row by row"
            );
            texts.iter().map(|t| model.embed_document(t)).collect()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Batch embedding failed, retrying row by row");
            texts.iter().map(|t| model.embed_document(t)).collect()
        }
    }
}
