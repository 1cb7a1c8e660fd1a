use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams};

use super::EmbeddingModel;

pub const MODEL_NAME: &str = "multi-qa-mpnet-base-dot-v1";

const PAD_TOKEN: &str = "<pad>";
const MPNET_PAD_ID: u32 = 1;

#[derive(Clone, Debug)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
}

impl OnnxConfig {
    /// Locate the model and tokenizer under `model_dir`, preferring optimized
    /// exports over the plain one.
    pub fn auto_detect(model_dir: &Path, dimension: usize, max_length: usize) -> Option<Self> {
        let base_path = if model_dir.join(MODEL_NAME).exists() {
            model_dir.join(MODEL_NAME)
        } else {
            model_dir.to_path_buf()
        };

        let model_path = ["model_O4.onnx", "model_quantized.onnx", "model.onnx"]
            .iter()
            .map(|name| base_path.join(name))
            .find(|path| path.exists())?;

        let tokenizer_path = base_path.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return None;
        }

        Some(Self {
            model_path,
            tokenizer_path,
            dimension,
            max_length,
        })
    }
}

/// Sentence-transformer embeddings run through ONNX Runtime.
///
/// The model was trained for dot-product scoring with CLS pooling, so vectors
/// are returned unnormalized. Queries and passages share the same session.
pub struct OnnxEmbeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    config: OnnxConfig,
}

impl OnnxEmbeddings {
    pub fn new(config: OnnxConfig) -> Result<Self> {
        ort::init().with_name("querytube_embeddings").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let mut tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;
        configure_tokenizer(&mut tokenizer, config.max_length)?;

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .with_inter_threads(1)
            .map_err(|e| anyhow!("Inter threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        tracing::info!(
            model = %config.model_path.display(),
            dimension = config.dimension,
            threads = num_threads,
            "ONNX embedding model loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| anyhow!("Model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        const MAX_BATCH_SIZE: usize = 8;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| anyhow!("Tokenization failed: {:?}", e))?;

            // Batch-longest padding gives every encoding the same length.
            let batch_size = encodings.len();
            let padded_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
            if padded_len == 0 {
                return Err(anyhow!("Tokenizer produced an empty encoding"));
            }

            let mut ids_flat = Vec::with_capacity(batch_size * padded_len);
            let mut mask_flat = Vec::with_capacity(batch_size * padded_len);
            for enc in &encodings {
                ids_flat.extend(enc.get_ids().iter().map(|&id| id as i64));
                mask_flat.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
            }
            if ids_flat.len() != batch_size * padded_len {
                return Err(anyhow!("Tokenizer returned ragged encodings"));
            }

            let shape = vec![batch_size, padded_len];
            let input_ids = Value::from_array((shape.clone(), ids_flat))
                .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
            let attention_mask = Value::from_array((shape, mask_flat))
                .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

            let inputs = ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

            all_embeddings.extend(self.extract_embeddings(&outputs, batch_size)?);
        }

        Ok(all_embeddings)
    }

    /// Prefer the pooled `sentence_embedding` output; otherwise take the CLS
    /// token (position 0) of `last_hidden_state`.
    fn extract_embeddings(
        &self,
        outputs: &SessionOutputs,
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let has_sentence_embedding = outputs
            .iter()
            .any(|(name, _)| name == "sentence_embedding");

        if has_sentence_embedding {
            let (shape, data) = outputs["sentence_embedding"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract sentence_embedding: {:?}", e))?;
            if shape.len() != 2 {
                return Err(anyhow!("Unexpected sentence_embedding rank {}", shape.len()));
            }
            let hidden_dim = shape[1] as usize;
            return Ok((0..batch_size)
                .map(|i| data[i * hidden_dim..(i + 1) * hidden_dim].to_vec())
                .collect());
        }

        let output_name = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state" || *name == "token_embeddings")
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| anyhow!("Model has no last_hidden_state output"))?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract output '{}': {:?}", output_name, e))?;

        if shape.len() != 3 {
            return Err(anyhow!("Unexpected {} rank {}", output_name, shape.len()));
        }
        let seq_len = shape[1] as usize;
        let hidden_dim = shape[2] as usize;

        Ok((0..batch_size)
            .map(|i| {
                let offset = i * seq_len * hidden_dim;
                data[offset..offset + hidden_dim].to_vec()
            })
            .collect())
    }
}

/// Truncate to `max_length` (keeping the closing special token) and pad each
/// batch to its longest sequence with the model's own pad token.
fn configure_tokenizer(tokenizer: &mut tokenizers::Tokenizer, max_length: usize) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("Failed to configure truncation: {:?}", e))?;

    let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(MPNET_PAD_ID);
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: PAD_TOKEN.to_string(),
        ..Default::default()
    }));
    Ok(())
}

impl EmbeddingModel for OnnxEmbeddings {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_detect_requires_model_and_tokenizer() {
        let dir = std::env::temp_dir().join(format!("querytube-onnx-{}", std::process::id()));
        let model_dir = dir.join(MODEL_NAME);
        std::fs::create_dir_all(&model_dir).unwrap();

        assert!(OnnxConfig::auto_detect(&dir, 768, 512).is_none());

        std::fs::write(model_dir.join("model.onnx"), b"stub").unwrap();
        assert!(OnnxConfig::auto_detect(&dir, 768, 512).is_none());

        std::fs::write(model_dir.join("tokenizer.json"), b"{}").unwrap();
        let config = OnnxConfig::auto_detect(&dir, 768, 512).unwrap();
        assert_eq!(config.model_path, model_dir.join("model.onnx"));
        assert_eq!(config.dimension, 768);

        std::fs::write(model_dir.join("model_O4.onnx"), b"stub").unwrap();
        let config = OnnxConfig::auto_detect(&dir, 768, 512).unwrap();
        assert_eq!(config.model_path, model_dir.join("model_O4.onnx"));

        std::fs::remove_dir_all(&dir).ok();
    }

    const WORD_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "<s>", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "</s>", "type_id": 0 } }
            ],
            "pair": [
                { "SpecialToken": { "id": "<s>", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "</s>", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 0 } },
                { "SpecialToken": { "id": "</s>", "type_id": 0 } }
            ],
            "special_tokens": {
                "<s>": { "id": "<s>", "ids": [0], "tokens": ["<s>"] },
                "</s>": { "id": "</s>", "ids": [2], "tokens": ["</s>"] }
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3,
                "black": 4, "holes": 5, "and": 6, "gravity": 7
            },
            "unk_token": "<unk>"
        }
    }"#;

    #[test]
    fn test_tokenizer_truncates_and_pads_like_mpnet() {
        use std::str::FromStr;

        let mut tokenizer = tokenizers::Tokenizer::from_str(WORD_TOKENIZER).unwrap();
        configure_tokenizer(&mut tokenizer, 4).unwrap();

        let encodings = tokenizer
            .encode_batch(vec!["black holes and gravity", "black"], true)
            .unwrap();

        // Truncation keeps the closing </s>.
        assert_eq!(encodings[0].get_ids(), &[0, 4, 5, 2]);
        assert_eq!(encodings[0].get_attention_mask(), &[1, 1, 1, 1]);
        // Shorter rows are padded with <pad> (id 1), masked out.
        assert_eq!(encodings[1].get_ids(), &[0, 4, 2, 1]);
        assert_eq!(encodings[1].get_attention_mask(), &[1, 1, 1, 0]);
    }

    #[test]
    fn test_missing_model_file_is_an_error() {
        let config = OnnxConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/tokenizer.json"),
            dimension: 768,
            max_length: 512,
        };
        assert!(OnnxEmbeddings::new(config).is_err());
    }
}
