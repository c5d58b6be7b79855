use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokenizers::{Tokenizer, TruncationParams};

use super::{EmbedError, Embedder};

pub const EMBEDDING_DIMENSION: usize = 768;

const MODEL_REPO: &str = "allenai/specter2";
const MODEL_URL: &str = "https://huggingface.co/allenai/specter2/resolve/main/onnx/model.onnx";
const MAX_TOKENS: usize = 512;

/// On-disk layout of a cached SPECTER2 model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    dir: PathBuf,
}

impl ModelFiles {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    fn onnx(&self) -> PathBuf {
        self.dir.join("specter2.onnx")
    }

    fn tokenizer(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Fetch the ONNX weights into the cache directory unless already present.
    pub async fn ensure_downloaded(&self) -> Result<()> {
        let onnx = self.onnx();
        if tokio::fs::try_exists(&onnx).await.unwrap_or(false) {
            tracing::debug!("SPECTER2 weights cached at {}", onnx.display());
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        tracing::info!("Downloading SPECTER2 weights from {}", MODEL_URL);
        let resp = reqwest::get(MODEL_URL)
            .await
            .context("Failed to download SPECTER2 weights")?;
        anyhow::ensure!(resp.status().is_success(), "Weights download returned {}", resp.status());
        let bytes = resp.bytes().await.context("Failed to read weights body")?;

        // write aside first so an interrupted download never looks cached
        let partial = onnx.with_extension("onnx.part");
        tokio::fs::write(&partial, &bytes)
            .await
            .context("Failed to write weights")?;
        tokio::fs::rename(&partial, &onnx)
            .await
            .context("Failed to move weights into place")?;
        tracing::info!("Saved {} bytes to {}", bytes.len(), onnx.display());
        Ok(())
    }

    fn load_tokenizer(&self) -> Result<Tokenizer> {
        let path = self.tokenizer();
        let mut tokenizer = if path.exists() {
            Tokenizer::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?
        } else {
            let tokenizer = Tokenizer::from_pretrained(MODEL_REPO, None)
                .map_err(|e| anyhow::anyhow!("Failed to fetch tokenizer: {}", e))?;
            if let Err(e) = tokenizer.save(&path, false) {
                tracing::warn!("Could not cache tokenizer at {}: {}", path.display(), e);
            }
            tokenizer
        };
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;
        Ok(tokenizer)
    }
}

struct Model {
    session: ort::session::Session,
    tokenizer: Tokenizer,
}

impl Model {
    /// CLS vector of the last hidden state (or the pooled output, when that is all the graph exposes).
    fn cls_embedding(&mut self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<_>>().into_boxed_slice();
        let len = encoding.get_ids().len();

        let input_ids = ort::value::Tensor::from_array(([1, len], widen(encoding.get_ids())))
            .context("Failed to build input_ids")?;
        let attention_mask =
            ort::value::Tensor::from_array(([1, len], widen(encoding.get_attention_mask())))
                .context("Failed to build attention_mask")?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
            .context("Inference failed")?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Model output is not an f32 tensor")?;

        anyhow::ensure!(
            matches!(shape.len(), 2 | 3) && data.len() >= EMBEDDING_DIMENSION,
            "Unexpected output shape {:?}",
            shape
        );
        Ok(data[..EMBEDDING_DIMENSION].to_vec())
    }
}

/// SPECTER2 run locally through ONNX Runtime.
pub struct SpecterEmbedder {
    model: Mutex<Model>,
}

impl SpecterEmbedder {
    /// Download the weights if needed, then load model and tokenizer.
    pub async fn load(dir: &Path) -> Result<Self> {
        let files = ModelFiles::new(dir);
        files.ensure_downloaded().await?;

        tokio::task::spawn_blocking(move || {
            let session = ort::session::Session::builder()
                .context("Failed to create ONNX session")?
                .commit_from_file(files.onnx())
                .context("Failed to load ONNX weights")?;
            let tokenizer = files.load_tokenizer()?;
            Ok(Self {
                model: Mutex::new(Model { session, tokenizer }),
            })
        })
        .await
        .context("Model loading task panicked")?
    }
}

#[async_trait]
impl Embedder for SpecterEmbedder {
    fn model_name(&self) -> &str {
        MODEL_REPO
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        tokio::task::block_in_place(|| {
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbedError::Model("model lock poisoned".to_string()))?;
            model
                .cls_embedding(text)
                .map_err(|e| EmbedError::Model(format!("{:#}", e)))
        })
    }
}
