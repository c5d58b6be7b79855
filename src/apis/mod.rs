pub mod openalex;
pub mod semantic_scholar;

use async_trait::async_trait;
use thiserror::Error;

const USER_AGENT: &str = concat!("paper-index/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
}

/// Title and plaintext abstract of a paper as one API reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperText {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
}

/// A bibliographic API that can resolve a DOI to the paper's text.
#[async_trait]
pub trait AbstractSource: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Ok(None)` when the API does not know the DOI.
    async fn lookup_doi(&self, doi: &str) -> Result<Option<PaperText>, SourceError>;
}

fn build_client(user_agent: &str) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder().user_agent(user_agent).build()?)
}
