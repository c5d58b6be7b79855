use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::apis::openalex::OpenAlexClient;
use crate::apis::semantic_scholar::SemanticScholarClient;
use crate::embed::openai::OpenAiEmbedder;
use crate::embed::{Embedder, MockEmbedder};
use crate::rct::{RctScorer, StaticRctScorer, DEFAULT_RCT_SCORE};
use crate::similarity::SimilarityScorer;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DOI: &str = "10.7717/peerj.4375";
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Locations of the source NDJSON files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFiles {
    pub openalex: PathBuf,
    pub s2ag_abstracts: PathBuf,
    pub s2ag_papers: PathBuf,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            openalex: PathBuf::from("data/openalex-sample.jsonl"),
            s2ag_abstracts: PathBuf::from("data/s2ag-abstracts-sample.jsonl"),
            s2ag_papers: PathBuf::from("data/s2ag-papers-sample.jsonl"),
        }
    }
}

/// Which embedding backend the similarity scorer uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderKind {
    OpenAi,
    Mock,
    /// Local SPECTER2 model stored in the given directory.
    Specter(PathBuf),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub elasticsearch_url: Option<String>,
    pub data_dir: PathBuf,
    pub files: DataFiles,
    pub batch_size: usize,
    pub bind: String,
    pub default_doi: String,
    pub rct_score: f64,
    pub embedder: EmbedderKind,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let data_dir = var("PAPER_INDEX_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join(".paper-index"));

        let defaults = DataFiles::default();
        let files = DataFiles {
            openalex: var("PAPER_INDEX_OPENALEX_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.openalex),
            s2ag_abstracts: var("PAPER_INDEX_S2AG_ABSTRACTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.s2ag_abstracts),
            s2ag_papers: var("PAPER_INDEX_S2AG_PAPERS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.s2ag_papers),
        };

        let batch_size = parse_or("PAPER_INDEX_BATCH_SIZE", var("PAPER_INDEX_BATCH_SIZE"), DEFAULT_BATCH_SIZE);
        let rct_score = parse_or("PAPER_INDEX_RCT_SCORE", var("PAPER_INDEX_RCT_SCORE"), DEFAULT_RCT_SCORE);

        let openai_api_key = var("OPENAI_API_KEY");
        let embedder = match var("PAPER_INDEX_EMBEDDER").map(|s| s.to_lowercase()).as_deref() {
            Some("mock") => EmbedderKind::Mock,
            Some("specter") => EmbedderKind::Specter(data_dir.join("models")),
            Some("openai") => EmbedderKind::OpenAi,
            Some(other) => {
                tracing::warn!("Unknown PAPER_INDEX_EMBEDDER '{}', falling back to openai", other);
                EmbedderKind::OpenAi
            }
            None => EmbedderKind::OpenAi,
        };

        Self {
            elasticsearch_url: var("ELASTICSEARCH_URL"),
            data_dir,
            files,
            batch_size,
            bind: var("PAPER_INDEX_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            default_doi: var("PAPER_INDEX_DEFAULT_DOI").unwrap_or_else(|| DEFAULT_DOI.to_string()),
            rct_score,
            embedder,
            openai_api_key,
            openai_model: var("OPENAI_EMBEDDING_MODEL"),
            semantic_scholar_api_key: var("SEMANTIC_SCHOLAR_API_KEY"),
            openalex_email: var("OPENALEX_EMAIL"),
        }
    }

    pub fn build_rct_scorer(&self) -> Arc<dyn RctScorer> {
        Arc::new(StaticRctScorer(self.rct_score))
    }

    /// Build the configured embedding backend.
    pub async fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        match &self.embedder {
            EmbedderKind::Mock => {
                tracing::warn!("Using mock embeddings; similarity scores are not meaningful");
                Ok(Arc::new(MockEmbedder))
            }
            EmbedderKind::OpenAi => {
                let embedder =
                    OpenAiEmbedder::new(self.openai_api_key.clone(), self.openai_model.clone())?;
                Ok(Arc::new(embedder))
            }
            #[cfg(feature = "onnx")]
            EmbedderKind::Specter(dir) => {
                let embedder = crate::embed::specter::SpecterEmbedder::load(dir).await?;
                Ok(Arc::new(embedder))
            }
            #[cfg(not(feature = "onnx"))]
            EmbedderKind::Specter(_) => {
                anyhow::bail!("The specter embedder requires building with the `onnx` feature")
            }
        }
    }

    /// Build the similarity scorer: OpenAlex against Semantic Scholar.
    pub async fn build_similarity(&self) -> Result<SimilarityScorer> {
        let openalex = OpenAlexClient::new(self.openalex_email.clone())?;
        let s2 = SemanticScholarClient::new(self.semantic_scholar_api_key.clone())?;
        Ok(SimilarityScorer::new(
            Arc::new(openalex),
            Arc::new(s2),
            self.build_embedder().await?,
            self.build_rct_scorer(),
        ))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}", key, v);
            default
        }),
        None => default,
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
