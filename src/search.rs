use std::sync::Arc;

use anyhow::Result;

use crate::index::{IndexQuery, PaperIndex, SearchHit};

/// Field free-text queries are matched against.
pub const SEARCH_FIELD: &str = "title";

/// Turns a free-text query into an index query and hands back the raw hits.
/// Ranking is left entirely to the index.
#[derive(Clone)]
pub struct SearchGateway {
    index: Arc<dyn PaperIndex>,
}

impl SearchGateway {
    pub fn new(index: Arc<dyn PaperIndex>) -> Self {
        Self { index }
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    pub async fn ping(&self) -> Result<()> {
        self.index.ping().await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self.index.search(build_query(query)).await?;
        tracing::info!("Got {} Hits", response.total);
        Ok(response.hits)
    }
}

/// Empty (or blank) input matches everything; anything else matches on title.
fn build_query(query: &str) -> IndexQuery<'_> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        IndexQuery::MatchAll
    } else {
        IndexQuery::Match { field: SEARCH_FIELD, text: trimmed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fulltext::FulltextIndex;
    use crate::record::{CanonicalRecord, Source};
    use tempfile::TempDir;

    fn paper(title: &str) -> CanonicalRecord {
        CanonicalRecord {
            title: title.to_string(),
            abstract_text: format!("Abstract of {}", title),
            author_names: vec![],
            publication_year: None,
            doi: None,
            cited_by_count: 0,
            rct_score: 0.0,
            source: Source::OpenAlex,
        }
    }

    #[test]
    fn test_build_query() {
        assert_eq!(build_query(""), IndexQuery::MatchAll);
        assert_eq!(build_query("   "), IndexQuery::MatchAll);
        assert_eq!(
            build_query(" neural networks "),
            IndexQuery::Match { field: "title", text: "neural networks" }
        );
    }

    #[tokio::test]
    async fn test_gateway_against_embedded_index() {
        let tmp = TempDir::new().unwrap();
        let index = Arc::new(FulltextIndex::create_or_open(tmp.path()).unwrap());
        index.upsert("1", &paper("Neural Networks in Practice")).await.unwrap();
        index.upsert("2", &paper("Convolutional Neural Networks")).await.unwrap();
        index.upsert("3", &paper("Medieval Trade Routes")).await.unwrap();
        index.refresh().await.unwrap();

        let gateway = SearchGateway::new(index);

        let all = gateway.search("").await.unwrap();
        assert_eq!(all.len(), 3);

        let hits = gateway.search("neural networks").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits
            .iter()
            .all(|h| h.source["title"].as_str().unwrap().contains("Neural Networks")));
        assert!(hits.iter().all(|h| h.score.unwrap_or(0.0) > 0.0));
    }
}
