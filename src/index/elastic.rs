use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{IndexQuery, PaperIndex, SearchHit, SearchResponse};
use crate::record::CanonicalRecord;

/// Elasticsearch-backed index, spoken to over its REST API.
pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Deserialize)]
struct EsHits {
    total: Option<EsTotal>,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct EsTotal {
    value: u64,
}

impl ElasticIndex {
    pub fn new(base_url: &str, index: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.index, path)
    }

    /// Create the index with explicit field mappings unless it already exists.
    pub async fn ensure_index(&self) -> Result<()> {
        let index_url = format!("{}/{}", self.base_url, self.index);
        let resp = self.client.head(&index_url).send().await
            .context("Failed to check index existence")?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("Unexpected status {} checking index {}", resp.status(), self.index);
        }

        tracing::info!("Creating index {}", self.index);
        let resp = self.client.put(&index_url)
            .json(&json!({ "mappings": mappings() }))
            .send().await
            .context("Failed to create index")?;
        check_status(resp, "create index").await?;
        Ok(())
    }

    pub fn query_body(query: IndexQuery<'_>) -> Value {
        match query {
            IndexQuery::MatchAll => json!({ "query": { "match_all": {} } }),
            IndexQuery::Match { field, text } => {
                let mut clause = serde_json::Map::new();
                clause.insert(field.to_string(), Value::String(text.to_string()));
                json!({ "query": { "match": clause } })
            }
        }
    }
}

fn mappings() -> Value {
    json!({
        "properties": {
            "title": { "type": "text" },
            "abstract": { "type": "text" },
            "authorNames": { "type": "text" },
            "publicationYear": { "type": "integer" },
            "doi": { "type": "keyword" },
            "citedByCount": { "type": "long" },
            "rctScore": { "type": "float" },
            "source": { "type": "keyword" }
        }
    })
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Elasticsearch {} failed with {}: {}", what, status, body)
}

#[async_trait]
impl PaperIndex for ElasticIndex {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<()> {
        let resp = self.client.head(&self.base_url).send().await
            .context("Elasticsearch is unreachable")?;
        check_status(resp, "ping").await?;
        Ok(())
    }

    async fn upsert(&self, id: &str, record: &CanonicalRecord) -> Result<()> {
        let resp = self.client.put(self.url(&format!("_doc/{}", id)))
            .json(record)
            .send().await
            .context("Failed to index document")?;
        check_status(resp, "index").await?;
        Ok(())
    }

    async fn search(&self, query: IndexQuery<'_>) -> Result<SearchResponse> {
        let resp = self.client.post(self.url("_search"))
            .json(&Self::query_body(query))
            .send().await
            .context("Search request failed")?;
        let body: EsSearchResponse = check_status(resp, "search").await?
            .json().await
            .context("Failed to parse search response")?;
        Ok(SearchResponse {
            total: body.hits.total.map(|t| t.value).unwrap_or(body.hits.hits.len() as u64),
            hits: body.hits.hits,
        })
    }

    async fn refresh(&self) -> Result<()> {
        let resp = self.client.post(self.url("_refresh")).send().await
            .context("Refresh request failed")?;
        check_status(resp, "refresh").await?;
        Ok(())
    }
}
