use std::path::Path;
use std::sync::Arc;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tantivy::{
    collector::{Count, TopDocs},
    doc,
    query::{AllQuery, BooleanQuery, EmptyQuery, Occur, Query, TermQuery},
    schema::*,
    tokenizer::TokenStream,
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tokio::sync::Mutex;

use super::{IndexQuery, PaperIndex, SearchHit, SearchResponse, INDEX_NAME};
use crate::record::{CanonicalRecord, Source};

/// Hits returned per query, matching Elasticsearch's default page size.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Embedded tantivy index holding canonical records keyed by fingerprint.
pub struct FulltextIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<Mutex<IndexWriter>>,
    page_size: usize,
    f_id: Field,
    f_title: Field,
    f_abstract: Field,
    f_authors: Field,
    f_year: Field,
    f_doi: Field,
    f_cited: Field,
    f_rct: Field,
    f_source: Field,
}

impl FulltextIndex {
    /// Create or open a tantivy index at the given directory.
    pub fn create_or_open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .context("Failed to create tantivy index directory")?;

        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_title = schema_builder.add_text_field("title", TEXT | STORED);
        let f_abstract = schema_builder.add_text_field("abstract", TEXT | STORED);
        let f_authors = schema_builder.add_text_field("authorNames", TEXT | STORED);
        let f_year = schema_builder.add_i64_field(
            "publicationYear",
            NumericOptions::default().set_stored().set_indexed(),
        );
        let f_doi = schema_builder.add_text_field("doi", STRING | STORED);
        let f_cited = schema_builder.add_u64_field(
            "citedByCount",
            NumericOptions::default().set_stored(),
        );
        let f_rct = schema_builder.add_f64_field(
            "rctScore",
            NumericOptions::default().set_stored(),
        );
        let f_source = schema_builder.add_text_field("source", STRING | STORED);
        let schema = schema_builder.build();

        let dir = tantivy::directory::MmapDirectory::open(path)
            .context("Failed to open MmapDirectory")?;
        let index = Index::open_or_create(dir, schema)
            .context("Failed to open or create tantivy index")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create index reader")?;

        let writer: IndexWriter = index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            page_size: DEFAULT_PAGE_SIZE,
            f_id,
            f_title,
            f_abstract,
            f_authors,
            f_year,
            f_doi,
            f_cited,
            f_rct,
            f_source,
        })
    }

    #[cfg(test)]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of committed documents.
    pub fn count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn build_document(&self, id: &str, record: &CanonicalRecord) -> TantivyDocument {
        let mut doc = doc!(
            self.f_id => id,
            self.f_title => record.title.as_str(),
            self.f_abstract => record.abstract_text.as_str(),
            self.f_cited => record.cited_by_count,
            self.f_rct => record.rct_score,
            self.f_source => record.source.as_str(),
        );
        for name in &record.author_names {
            doc.add_text(self.f_authors, name);
        }
        if let Some(year) = record.publication_year {
            doc.add_i64(self.f_year, year as i64);
        }
        if let Some(ref doi) = record.doi {
            doc.add_text(self.f_doi, doi);
        }
        doc
    }

    fn read_document(&self, doc: &TantivyDocument) -> Result<(String, CanonicalRecord)> {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let id = text(self.f_id).context("Stored document has no id")?;
        let source = text(self.f_source)
            .context("Stored document has no source")?
            .parse::<Source>()?;
        let record = CanonicalRecord {
            title: text(self.f_title).unwrap_or_default(),
            abstract_text: text(self.f_abstract).unwrap_or_default(),
            author_names: doc
                .get_all(self.f_authors)
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            publication_year: doc
                .get_first(self.f_year)
                .and_then(|v| v.as_i64())
                .map(|y| y as i32),
            doi: text(self.f_doi),
            cited_by_count: doc.get_first(self.f_cited).and_then(|v| v.as_u64()).unwrap_or(0),
            rct_score: doc.get_first(self.f_rct).and_then(|v| v.as_f64()).unwrap_or(0.0),
            source,
        };
        Ok((id, record))
    }

    /// OR of the analyzed terms of `text` on `field`, like an Elasticsearch match query.
    fn match_query(&self, field: &str, text: &str) -> Result<Box<dyn Query>> {
        let field = self
            .index
            .schema()
            .get_field(field)
            .with_context(|| format!("Unknown field: {}", field))?;
        let mut analyzer = self
            .index
            .tokenizer_for_field(field)
            .context("Field is not full-text searchable")?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let mut stream = analyzer.token_stream(text);
        while stream.advance() {
            let term = Term::from_field_text(field, &stream.token().text);
            clauses.push((
                Occur::Should,
                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
            ));
        }

        if clauses.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }
}

#[async_trait]
impl PaperIndex for FulltextIndex {
    fn name(&self) -> &str {
        "tantivy"
    }

    async fn ping(&self) -> Result<()> {
        tracing::debug!("Embedded index holds {} documents", self.count());
        Ok(())
    }

    async fn upsert(&self, id: &str, record: &CanonicalRecord) -> Result<()> {
        let doc = self.build_document(id, record);
        let writer = self.writer.lock().await;
        // Replace any document already stored under this id
        writer.delete_term(Term::from_field_text(self.f_id, id));
        writer.add_document(doc).context("Failed to add document")?;
        Ok(())
    }

    async fn search(&self, query: IndexQuery<'_>) -> Result<SearchResponse> {
        let query: Box<dyn Query> = match query {
            IndexQuery::MatchAll => Box::new(AllQuery),
            IndexQuery::Match { field, text } => self.match_query(field, text)?,
        };

        let searcher = self.reader.searcher();
        let (top_docs, total) = searcher
            .search(query.as_ref(), &(TopDocs::with_limit(self.page_size), Count))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;
            let (id, record) = self.read_document(&doc)?;
            hits.push(SearchHit {
                index: INDEX_NAME.to_string(),
                id,
                score: Some(score as f64),
                source: serde_json::to_value(&record).context("Failed to serialize document")?,
            });
        }

        Ok(SearchResponse {
            total: total as u64,
            hits,
        })
    }

    async fn refresh(&self) -> Result<()> {
        let mut writer = self.writer.clone().lock_owned().await;
        // commit fsyncs segments; keep it off the async workers
        tokio::task::spawn_blocking(move || writer.commit())
            .await
            .context("Commit task panicked")?
            .context("Failed to commit")?;
        self.reader.reload().context("Failed to reload reader")?;
        Ok(())
    }
}
