//! Auto-download the sentence-transformer ONNX export from HuggingFace.
//!
//! Fetched on first run when `embedding.auto_download` is set:
//! - sentence-transformers/multi-qa-mpnet-base-dot-v1 (onnx/model.onnx, ~435 MB)

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::onnx::MODEL_NAME;

const HF_BASE: &str = "https://huggingface.co";
const MODEL_REPO: &str = "sentence-transformers/multi-qa-mpnet-base-dot-v1";
const MAX_RETRIES: u32 = 3;

/// Model file descriptor: (relative_url_path, local_filename, expected_min_bytes)
struct ModelFile {
    url_path: &'static str,
    local_name: &'static str,
    min_bytes: u64,
}

const MODEL_FILES: &[ModelFile] = &[
    ModelFile {
        url_path: "onnx/model.onnx",
        local_name: "model.onnx",
        min_bytes: 100_000_000,
    },
    ModelFile {
        url_path: "tokenizer.json",
        local_name: "tokenizer.json",
        min_bytes: 10_000,
    },
];

/// Ensure the embedding model is present under `model_dir`, downloading
/// whatever is missing. Returns the model directory path.
pub async fn ensure_model(model_dir: &Path) -> Result<PathBuf> {
    let target_dir = model_dir.join(MODEL_NAME);
    let missing = missing_files(&target_dir);

    if missing.is_empty() {
        return Ok(target_dir);
    }

    tracing::info!(
        model = MODEL_NAME,
        missing_files = missing.len(),
        dir = %target_dir.display(),
        "Auto-downloading model files from HuggingFace"
    );

    tokio::fs::create_dir_all(&target_dir).await.map_err(|e| {
        anyhow!(
            "Failed to create model directory {}: {}",
            target_dir.display(),
            e
        )
    })?;

    let client = reqwest::Client::builder()
        .user_agent("querytube/0.1")
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    for file in &missing {
        fetch_file(&client, &target_dir, file).await?;
    }

    tracing::info!(model = MODEL_NAME, "All model files downloaded successfully");
    Ok(target_dir)
}

/// Files that are absent or too small to be a complete download.
fn missing_files(target_dir: &Path) -> Vec<&'static ModelFile> {
    MODEL_FILES
        .iter()
        .filter(|f| match target_dir.join(f.local_name).metadata() {
            Ok(meta) => meta.len() < f.min_bytes,
            Err(_) => true,
        })
        .collect()
}

impl ModelFile {
    fn url(&self) -> String {
        format!("{}/{}/resolve/main/{}", HF_BASE, MODEL_REPO, self.url_path)
    }

    fn is_complete(&self, bytes: u64) -> bool {
        bytes >= self.min_bytes
    }
}

/// `<dest>.part`, where bytes land until the file is known to be complete.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Download one model file, retrying on transport errors and on bodies that
/// come up short of the file's minimum size. Only a complete file is renamed
/// into place.
async fn fetch_file(
    client: &reqwest::Client,
    target_dir: &Path,
    file: &ModelFile,
) -> Result<()> {
    let url = file.url();
    let dest = target_dir.join(file.local_name);
    let partial = partial_path(&dest);
    let mut last_error = anyhow!("no download attempted for {}", file.local_name);

    for attempt in 1..=MAX_RETRIES {
        let outcome = match stream_to(client, &url, &partial, file.local_name).await {
            Ok(bytes) if file.is_complete(bytes) => Ok(bytes),
            Ok(bytes) => Err(anyhow!(
                "{} is truncated: {} bytes, expected at least {}",
                file.local_name,
                bytes,
                file.min_bytes
            )),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &dest)
                    .await
                    .map_err(|e| anyhow!("Failed to finalize {}: {}", file.local_name, e))?;
                tracing::info!(
                    file = file.local_name,
                    size_mb = format!("{:.1}", bytes as f64 / 1_048_576.0),
                    "Download complete"
                );
                return Ok(());
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                if attempt < MAX_RETRIES {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        file = file.local_name,
                        attempt,
                        error = %e,
                        "Download failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    Err(last_error.context(format!(
        "Giving up on {} after {} attempts",
        file.local_name, MAX_RETRIES
    )))
}

/// Logs at each new 10% step of a download with a known length.
struct Progress {
    total: u64,
    received: u64,
    logged_step: u64,
}

impl Progress {
    fn new(total: u64) -> Self {
        Self {
            total,
            received: 0,
            logged_step: 0,
        }
    }

    /// Record `bytes` more; returns the percentage when a new step is crossed.
    fn advance(&mut self, bytes: u64) -> Option<u64> {
        self.received += bytes;
        if self.total == 0 {
            return None;
        }
        let step = (self.received * 10 / self.total).min(10);
        if step > self.logged_step {
            self.logged_step = step;
            Some(step * 10)
        } else {
            None
        }
    }
}

/// Stream the response body into `path`, returning the number of bytes written.
async fn stream_to(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    filename: &str,
) -> Result<u64> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| anyhow!("Request for {} failed: {}", filename, e))?;

    let mut progress = Progress::new(response.content_length().unwrap_or(0));
    tracing::info!(
        file = filename,
        size_mb = format!("{:.1}", progress.total as f64 / 1_048_576.0),
        "Downloading"
    );

    let mut out = tokio::fs::File::create(path)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", path.display(), e))?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| anyhow!("Stream error downloading {}: {}", filename, e))?;
        out.write_all(&chunk)
            .await
            .map_err(|e| anyhow!("Write error for {}: {}", filename, e))?;
        if let Some(pct) = progress.advance(chunk.len() as u64) {
            tracing::info!(file = filename, progress = format!("{}%", pct), "Download progress");
        }
    }
    out.flush().await?;

    Ok(progress.received)
}
