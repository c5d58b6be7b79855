use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::apis::{AbstractSource, PaperText, SourceError};
use crate::embed::{cosine_similarity, EmbedError, Embedder};
use crate::rct::RctScorer;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("{source_name} lookup failed: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },
    #[error("Embedding failed: {0}")]
    Embed(#[from] EmbedError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityReport {
    pub doi: String,
    /// Cosine similarity of the two abstracts' embeddings.
    pub similarity: f32,
    /// Embedding model that produced `similarity`.
    pub model: String,
    pub rct_score: f64,
}

/// Compares the abstracts two bibliographic APIs hold for the same DOI.
#[derive(Clone)]
pub struct SimilarityScorer {
    primary: Arc<dyn AbstractSource>,
    secondary: Arc<dyn AbstractSource>,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn RctScorer>,
}

impl SimilarityScorer {
    pub fn new(
        primary: Arc<dyn AbstractSource>,
        secondary: Arc<dyn AbstractSource>,
        embedder: Arc<dyn Embedder>,
        scorer: Arc<dyn RctScorer>,
    ) -> Self {
        Self { primary, secondary, embedder, scorer }
    }

    /// Returns `Ok(None)` when either source has no abstract for `doi`.
    pub async fn score_doi(&self, doi: &str) -> Result<Option<SimilarityReport>, SimilarityError> {
        let (alpha, beta) = tokio::join!(
            lookup(self.primary.as_ref(), doi),
            lookup(self.secondary.as_ref(), doi),
        );
        let (Some(alpha), Some(beta)) = (alpha?, beta?) else {
            tracing::info!("No abstract on both sides for {}, skipping similarity", doi);
            return Ok(None);
        };
        let (Some(abstract_alpha), Some(abstract_beta)) =
            (alpha.abstract_text.as_deref(), beta.abstract_text.as_deref())
        else {
            return Ok(None);
        };

        let emb_alpha = self.embedder.embed(abstract_alpha).await?;
        let emb_beta = self.embedder.embed(abstract_beta).await?;
        let similarity = cosine_similarity(&emb_alpha, &emb_beta);
        tracing::info!(
            "Similarity for {} ({}): {:.4}",
            doi,
            self.embedder.model_name(),
            similarity
        );

        let title = alpha.title.as_deref().or(beta.title.as_deref()).unwrap_or_default();
        let rct_score = self.scorer.score(title, abstract_alpha);

        Ok(Some(SimilarityReport {
            doi: doi.to_string(),
            similarity,
            model: self.embedder.model_name().to_string(),
            rct_score,
        }))
    }
}

/// A lookup counts as found only when it carries a non-blank abstract.
async fn lookup(source: &dyn AbstractSource, doi: &str) -> Result<Option<PaperText>, SimilarityError> {
    let found = source
        .lookup_doi(doi)
        .await
        .map_err(|error| SimilarityError::Source {
            source_name: source.name().to_string(),
            error,
        })?;
    Ok(found.filter(|p| p.abstract_text.as_deref().is_some_and(|a| !a.trim().is_empty())))
}
