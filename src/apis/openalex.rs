use super::{build_client, AbstractSource, PaperText, SourceError, USER_AGENT};
use crate::abstract_index::InvertedIndex;
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.openalex.org";

/// An OpenAlex work, as found both in snapshot NDJSON files and in API responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAlexWork {
    pub title: Option<String>,
    pub abstract_inverted_index: Option<InvertedIndex>,
    pub authorships: Option<Vec<OAAuthorship>>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub cited_by_count: Option<u64>,
}

impl OpenAlexWork {
    pub fn author_names(&self) -> Vec<String> {
        self.authorships
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.author.display_name.clone())
            .collect()
    }

    pub fn has_authors(&self) -> bool {
        self.authorships.as_ref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAAuthorship {
    #[serde(default)]
    pub author: OAAuthor,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAAuthor {
    pub display_name: Option<String>,
}

pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAlexClient {
    pub fn new(email: Option<String>) -> Result<Self, SourceError> {
        Self::with_base_url(email, BASE_URL)
    }

    pub fn with_base_url(email: Option<String>, base_url: &str) -> Result<Self, SourceError> {
        let ua = match email {
            Some(ref e) => format!("{} (mailto:{})", USER_AGENT, e),
            None => USER_AGENT.to_string(),
        };
        Ok(Self {
            client: build_client(&ua)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a work by DOI. OpenAlex accepts the DOI URL as the work id.
    pub async fn get_work_by_doi(&self, doi: &str) -> Result<Option<OpenAlexWork>, SourceError> {
        let url = format!("{}/works/https://doi.org/{}", self.base_url, doi);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!("OpenAlex returned {}", resp.status())));
        }
        let work: OpenAlexWork = resp.json().await?;
        Ok(Some(work))
    }
}

#[async_trait]
impl AbstractSource for OpenAlexClient {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn lookup_doi(&self, doi: &str) -> Result<Option<PaperText>, SourceError> {
        let work = self.get_work_by_doi(doi).await?;
        Ok(work.map(|w| PaperText {
            abstract_text: w
                .abstract_inverted_index
                .filter(|idx| !idx.is_empty())
                .map(|idx| idx.reconstruct()),
            title: w.title,
        }))
    }
}
