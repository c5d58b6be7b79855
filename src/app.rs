use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::index;
use crate::ingest::Pipeline;
use crate::search::SearchGateway;
use crate::similarity::SimilarityScorer;

/// Long-lived services shared by the HTTP, MCP and CLI surfaces.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub gateway: SearchGateway,
    pub pipeline: Pipeline,
    pub similarity: SimilarityScorer,
}

impl App {
    /// Connect to the index and wire every service. An unreachable index is fatal.
    pub async fn build(config: Config) -> Result<Self> {
        tracing::info!(
            "Configured data_dir={}, batch_size={}",
            config.data_dir.display(),
            config.batch_size
        );
        let index = index::connect(config.elasticsearch_url.as_deref(), &config.data_dir).await?;
        let pipeline = Pipeline::new(index.clone(), config.build_rct_scorer());
        let similarity = config.build_similarity().await?;

        Ok(Self {
            gateway: SearchGateway::new(index),
            pipeline,
            similarity,
            config: Arc::new(config),
        })
    }
}
