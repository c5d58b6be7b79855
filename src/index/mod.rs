pub mod elastic;
pub mod fulltext;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::CanonicalRecord;

/// Name of the index every record is written to.
pub const INDEX_NAME: &str = "papers";

/// Query shapes the gateway issues against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexQuery<'a> {
    MatchAll,
    /// Full-text match of `text` against a single document field.
    Match { field: &'a str, text: &'a str },
}

/// One ranked hit, in the engine's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    /// The stored document exactly as the engine returns it.
    #[serde(rename = "_source")]
    pub source: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Total matching documents, which may exceed `hits.len()`.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// A document index supporting upsert by id and title search.
#[async_trait]
pub trait PaperIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Connectivity probe; an error means the index cannot serve requests.
    async fn ping(&self) -> Result<()>;

    /// Insert `record` under `id`, replacing any document already stored there.
    async fn upsert(&self, id: &str, record: &CanonicalRecord) -> Result<()>;

    async fn search(&self, query: IndexQuery<'_>) -> Result<SearchResponse>;

    /// Make all upserts so far visible to search.
    async fn refresh(&self) -> Result<()>;
}

/// Open the configured index: Elasticsearch when a URL is given, otherwise the
/// embedded tantivy index under `data_dir`. Fails if the index is unreachable.
pub async fn connect(elasticsearch_url: Option<&str>, data_dir: &Path) -> Result<Arc<dyn PaperIndex>> {
    match elasticsearch_url {
        Some(url) => {
            tracing::info!("Elastic host is {}", url);
            let es = elastic::ElasticIndex::new(url, INDEX_NAME)?;
            probe(&es).await?;
            es.ensure_index().await?;
            Ok(Arc::new(es))
        }
        None => {
            let path = data_dir.join("tantivy");
            tracing::info!("Using embedded index at {}", path.display());
            let local = fulltext::FulltextIndex::create_or_open(&path)?;
            probe(&local).await?;
            Ok(Arc::new(local))
        }
    }
}

async fn probe(index: &dyn PaperIndex) -> Result<()> {
    index
        .ping()
        .await
        .with_context(|| format!("Could not connect to {} index", index.name()))?;
    tracing::info!("Connected to {} index", index.name());
    Ok(())
}
