use super::{build_client, AbstractSource, PaperText, SourceError, USER_AGENT};
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "title,abstract,citationCount,authors,publicationDate";

/// A Semantic Scholar paper.
///
/// The S2AG dataset dumps use all-lowercase keys (`externalids`,
/// `citationcount`) while the Graph API answers in camelCase; both are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S2Paper {
    #[serde(alias = "corpusId")]
    pub corpusid: Option<u64>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Option<Vec<S2Author>>,
    pub year: Option<i32>,
    #[serde(rename = "externalids", alias = "externalIds")]
    pub external_ids: Option<S2ExternalIds>,
    #[serde(rename = "citationcount", alias = "citationCount")]
    pub citation_count: Option<u64>,
}

impl S2Paper {
    pub fn author_names(&self) -> Vec<String> {
        self.authors
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.name.clone())
            .collect()
    }

    pub fn doi(&self) -> Option<String> {
        self.external_ids.as_ref().and_then(|e| e.doi.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S2Author {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S2ExternalIds {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
}

/// One line of the S2AG abstracts dataset, paired with the papers dataset by line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S2AbstractLine {
    #[serde(alias = "corpusId")]
    pub corpusid: Option<u64>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>) -> Result<Self, SourceError> {
        Self::with_base_url(api_key, BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(USER_AGENT)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    pub async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<S2Paper>, SourceError> {
        let url = format!("{}/paper/DOI:{}", self.base_url, doi);
        let resp = self
            .add_auth(self.client.get(&url).query(&[("fields", FIELDS)]))
            .send()
            .await?;
        if resp.status() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!(
                "Semantic Scholar returned {}",
                resp.status()
            )));
        }
        let paper: S2Paper = resp.json().await?;
        Ok(Some(paper))
    }
}

#[async_trait]
impl AbstractSource for SemanticScholarClient {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn lookup_doi(&self, doi: &str) -> Result<Option<PaperText>, SourceError> {
        let paper = self.get_paper_by_doi(doi).await?;
        Ok(paper.map(|p| PaperText {
            title: p.title,
            abstract_text: p.abstract_text,
        }))
    }
}
