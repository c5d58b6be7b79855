use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::apis::openalex::OpenAlexWork;
use crate::apis::semantic_scholar::{S2AbstractLine, S2Paper};
use crate::config::DataFiles;
use crate::fingerprint::fingerprint;
use crate::index::PaperIndex;
use crate::normalize::{admit_openalex, admit_s2ag, normalize, SkipReason};
use crate::rct::RctScorer;
use crate::record::{CanonicalRecord, RawRecord, RawRecordError, Source};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The two S2AG companion files no longer pair up line by line.
    #[error("S2AG files misaligned at line {line}: {reason}")]
    Misaligned { line: usize, reason: String },
    #[error("Rejected record: {0}")]
    Record(#[from] RawRecordError),
    #[error("Index error: {0:#}")]
    Index(#[from] anyhow::Error),
}

impl IngestError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        IngestError::Io { path: path.to_path_buf(), source }
    }
}

/// Outcome of one bounded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: Source,
    /// Lines (or line pairs) consumed, valid or not.
    pub lines_read: usize,
    pub indexed: usize,
    pub skipped: usize,
}

/// Outcome of indexing a single record handed over directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordOutcome {
    Indexed { id: String },
    Skipped { reason: String },
}

impl IngestReport {
    fn new(source: Source) -> Self {
        Self { source, lines_read: 0, indexed: 0, skipped: 0 }
    }
}

/// Reads source files, normalizes and fingerprints each record, and upserts it.
#[derive(Clone)]
pub struct Pipeline {
    index: Arc<dyn PaperIndex>,
    scorer: Arc<dyn RctScorer>,
}

impl Pipeline {
    pub fn new(index: Arc<dyn PaperIndex>, scorer: Arc<dyn RctScorer>) -> Self {
        Self { index, scorer }
    }

    /// Run both source batches, OpenAlex first.
    pub async fn process_data(
        &self,
        files: &DataFiles,
        batch_size: usize,
    ) -> Result<Vec<IngestReport>, IngestError> {
        let openalex = self.ingest(Source::OpenAlex, files, batch_size).await?;
        let s2ag = self.ingest(Source::S2ag, files, batch_size).await?;
        Ok(vec![openalex, s2ag])
    }

    pub async fn ingest(
        &self,
        source: Source,
        files: &DataFiles,
        max_records: usize,
    ) -> Result<IngestReport, IngestError> {
        match source {
            Source::OpenAlex => self.ingest_openalex(&files.openalex, max_records).await,
            Source::S2ag => {
                self.ingest_s2ag(&files.s2ag_abstracts, &files.s2ag_papers, max_records)
                    .await
            }
        }
    }

    /// Normalize and upsert one raw record tagged with its source name.
    /// S2AG records must already carry their abstract.
    pub async fn index_record(
        &self,
        tag: &str,
        value: serde_json::Value,
    ) -> Result<RecordOutcome, IngestError> {
        let raw = RawRecord::from_tagged(tag, value)?;
        let admitted = match &raw {
            RawRecord::OpenAlex(work) => admit_openalex(work),
            RawRecord::S2ag(_) => Ok(()),
        };
        let outcome = admitted.and_then(|()| normalize(raw, self.scorer.as_ref()));
        match outcome {
            Ok(record) => {
                let id = fingerprint(&record.title, &record.abstract_text);
                self.index.upsert(&id, &record).await?;
                self.index.refresh().await?;
                tracing::info!("Indexed {} record {}", record.source, id);
                Ok(RecordOutcome::Indexed { id })
            }
            Err(reason) => Ok(RecordOutcome::Skipped { reason: reason.to_string() }),
        }
    }

    /// Ingest at most `max_records` lines of an OpenAlex works NDJSON file.
    pub async fn ingest_openalex(
        &self,
        path: &Path,
        max_records: usize,
    ) -> Result<IngestReport, IngestError> {
        let outcome = self.read_openalex(path, max_records).await;
        self.finish(outcome).await
    }

    async fn read_openalex(
        &self,
        path: &Path,
        max_records: usize,
    ) -> Result<IngestReport, IngestError> {
        let mut lines = open_lines(path).await?;
        let mut report = IngestReport::new(Source::OpenAlex);

        while report.lines_read < max_records {
            let Some(line) = lines.next_line().await.map_err(|e| IngestError::io(path, e))? else {
                break;
            };
            report.lines_read += 1;

            let outcome = parse_openalex(&line)
                .and_then(|raw| normalize(raw, self.scorer.as_ref()));
            self.apply(outcome, &mut report).await?;
        }

        Ok(report)
    }

    /// Ingest at most `max_records` line pairs of the S2AG abstracts and papers
    /// files. Line `n` of one file describes the same paper as line `n` of the other.
    pub async fn ingest_s2ag(
        &self,
        abstracts_path: &Path,
        papers_path: &Path,
        max_records: usize,
    ) -> Result<IngestReport, IngestError> {
        let outcome = self
            .read_s2ag(abstracts_path, papers_path, max_records)
            .await;
        self.finish(outcome).await
    }

    async fn read_s2ag(
        &self,
        abstracts_path: &Path,
        papers_path: &Path,
        max_records: usize,
    ) -> Result<IngestReport, IngestError> {
        let mut abstracts = open_lines(abstracts_path).await?;
        let mut papers = open_lines(papers_path).await?;
        let mut report = IngestReport::new(Source::S2ag);

        while report.lines_read < max_records {
            let abstract_line = abstracts
                .next_line()
                .await
                .map_err(|e| IngestError::io(abstracts_path, e))?;
            let paper_line = papers
                .next_line()
                .await
                .map_err(|e| IngestError::io(papers_path, e))?;
            let line_no = report.lines_read + 1;

            let (abstract_line, paper_line) = match (abstract_line, paper_line) {
                (Some(a), Some(p)) => (a, p),
                (None, None) => break,
                (Some(_), None) => return Err(misaligned(line_no, "papers file ended first")),
                (None, Some(_)) => return Err(misaligned(line_no, "abstracts file ended first")),
            };
            report.lines_read += 1;

            let parsed = serde_json::from_str::<S2AbstractLine>(&abstract_line)
                .and_then(|a| Ok((a, serde_json::from_str::<S2Paper>(&paper_line)?)));
            let outcome = match parsed {
                Ok((abstract_line, paper)) => {
                    check_alignment(&abstract_line, &paper, line_no)?;
                    admit_s2ag(abstract_line, paper)
                        .and_then(|raw| normalize(raw, self.scorer.as_ref()))
                }
                Err(e) => Err(SkipReason::Malformed(e.to_string())),
            };
            self.apply(outcome, &mut report).await?;
        }

        Ok(report)
    }

    async fn apply(
        &self,
        outcome: Result<CanonicalRecord, SkipReason>,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        match outcome {
            Ok(record) => {
                let id = fingerprint(&record.title, &record.abstract_text);
                self.index.upsert(&id, &record).await?;
                report.indexed += 1;
            }
            Err(reason) => {
                tracing::debug!(
                    "Skipping {} line {}: {}",
                    report.source,
                    report.lines_read,
                    reason
                );
                report.skipped += 1;
            }
        }
        Ok(())
    }

    /// Refresh the index whether or not the batch completed, so records
    /// upserted before a failure are committed and searchable.
    async fn finish(
        &self,
        outcome: Result<IngestReport, IngestError>,
    ) -> Result<IngestReport, IngestError> {
        let refreshed = self.index.refresh().await;
        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                if let Err(e) = refreshed {
                    tracing::warn!("Refresh after failed batch also failed: {:#}", e);
                }
                return Err(err);
            }
        };
        refreshed?;
        tracing::info!(
            "Ingested {}: {} lines read, {} indexed, {} skipped",
            report.source,
            report.lines_read,
            report.indexed,
            report.skipped
        );
        Ok(report)
    }
}

async fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>, IngestError> {
    let file = File::open(path).await.map_err(|e| IngestError::io(path, e))?;
    Ok(BufReader::new(file).lines())
}

fn parse_openalex(line: &str) -> Result<RawRecord, SkipReason> {
    let work: OpenAlexWork =
        serde_json::from_str(line).map_err(|e| SkipReason::Malformed(e.to_string()))?;
    admit_openalex(&work)?;
    Ok(RawRecord::OpenAlex(work))
}

/// Both S2AG files carry `corpusid`; when present on both sides they must agree.
fn check_alignment(
    abstract_line: &S2AbstractLine,
    paper: &S2Paper,
    line: usize,
) -> Result<(), IngestError> {
    match (abstract_line.corpusid, paper.corpusid) {
        (Some(a), Some(p)) if a != p => Err(misaligned(
            line,
            &format!("abstract corpusid {} does not match paper corpusid {}", a, p),
        )),
        _ => Ok(()),
    }
}

fn misaligned(line: usize, reason: &str) -> IngestError {
    IngestError::Misaligned { line, reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::index::fulltext::FulltextIndex;
    use crate::index::{IndexQuery, SearchResponse};
    use crate::rct::StaticRctScorer;

    /// In-memory index recording every upsert.
    #[derive(Default)]
    struct RecordingIndex {
        docs: Mutex<HashMap<String, CanonicalRecord>>,
        upserts: Mutex<usize>,
    }

    #[async_trait]
    impl PaperIndex for RecordingIndex {
        fn name(&self) -> &str {
            "recording"
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn upsert(&self, id: &str, record: &CanonicalRecord) -> anyhow::Result<()> {
            *self.upserts.lock().unwrap() += 1;
            self.docs.lock().unwrap().insert(id.to_string(), record.clone());
            Ok(())
        }

        async fn search(&self, _query: IndexQuery<'_>) -> anyhow::Result<SearchResponse> {
            Ok(SearchResponse::default())
        }

        async fn refresh(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn write_lines(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn openalex_line(title: &str, word: &str) -> String {
        let mut inverted = serde_json::Map::new();
        inverted.insert(word.to_string(), json!([0]));
        json!({
            "id": format!("https://openalex.org/{}", title),
            "title": title,
            "abstract_inverted_index": inverted,
            "authorships": [{"author": {"display_name": "Ada"}}],
            "publication_year": 2020,
            "doi": "10.1/x",
            "cited_by_count": 1
        })
        .to_string()
    }

    fn pipeline(index: Arc<dyn PaperIndex>) -> Pipeline {
        Pipeline::new(index, Arc::new(StaticRctScorer::default()))
    }

    #[tokio::test]
    async fn test_end_to_end_openalex_record() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(&tmp, "openalex.jsonl", &[openalex_line("T1", "x")]);
        let index = Arc::new(FulltextIndex::create_or_open(&tmp.path().join("idx")).unwrap());

        let report = pipeline(index.clone()).ingest_openalex(&path, 10).await.unwrap();
        assert_eq!(report.indexed, 1);

        let resp = index.search(IndexQuery::MatchAll).await.unwrap();
        assert_eq!(resp.total, 1);
        let hit = &resp.hits[0];
        assert_eq!(hit.id, fingerprint("T1", "x"));
        assert_eq!(hit.source["title"], "T1");
        assert_eq!(hit.source["abstract"], "x");
        assert_eq!(hit.source["doi"], "10.1/x");
        assert_eq!(hit.source["source"], "openalex");
    }

    #[tokio::test]
    async fn test_batch_bound_counts_lines_not_valid_records() {
        let tmp = TempDir::new().unwrap();
        let mut lines = vec![
            json!({"title": "No abstract", "authorships": [{"author": {"display_name": "A"}}]}).to_string(),
            "not json at all".to_string(),
        ];
        lines.extend((0..998).map(|i| openalex_line(&format!("Paper {}", i), "w")));
        let path = write_lines(&tmp, "openalex.jsonl", &lines);

        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone()).ingest_openalex(&path, 5).await.unwrap();

        assert_eq!(report.lines_read, 5);
        assert_eq!(report.indexed, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(*index.upserts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_openalex_skips_empty_authorships() {
        let tmp = TempDir::new().unwrap();
        let lines = vec![
            json!({"title": "Lonely", "abstract_inverted_index": {"x": [0]}, "authorships": []}).to_string(),
            openalex_line("Kept", "y"),
        ];
        let path = write_lines(&tmp, "openalex.jsonl", &lines);

        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone()).ingest_openalex(&path, 10).await.unwrap();
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.indexed, 1);
        assert!(index.docs.lock().unwrap().contains_key(&fingerprint("Kept", "y")));
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = write_lines(
            &tmp,
            "openalex.jsonl",
            &[openalex_line("T1", "x"), openalex_line("T2", "y")],
        );
        let index = Arc::new(FulltextIndex::create_or_open(&tmp.path().join("idx")).unwrap());
        let p = pipeline(index.clone());

        p.ingest_openalex(&path, 10).await.unwrap();
        p.ingest_openalex(&path, 10).await.unwrap();
        assert_eq!(index.count(), 2);
    }

    #[tokio::test]
    async fn test_same_content_from_both_sources_shares_one_entry() {
        let tmp = TempDir::new().unwrap();
        let oa = write_lines(&tmp, "openalex.jsonl", &[openalex_line("Shared", "text")]);
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[json!({"corpusid": 1, "abstract": "text"}).to_string()],
        );
        let papers = write_lines(
            &tmp,
            "papers.jsonl",
            &[json!({"corpusid": 1, "title": "Shared", "authors": [], "year": 2021,
                     "externalids": {"DOI": "10.1/x"}, "citationcount": 8}).to_string()],
        );

        let index = Arc::new(RecordingIndex::default());
        let p = pipeline(index.clone());
        p.ingest_openalex(&oa, 10).await.unwrap();
        p.ingest_s2ag(&abstracts, &papers, 10).await.unwrap();

        let docs = index.docs.lock().unwrap();
        assert_eq!(docs.len(), 1);
        // last write wins
        let doc = &docs[&fingerprint("Shared", "text")];
        assert_eq!(doc.source, Source::S2ag);
        assert_eq!(doc.cited_by_count, 8);
    }

    #[tokio::test]
    async fn test_s2ag_pairs_by_line() {
        let tmp = TempDir::new().unwrap();
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[
                json!({"corpusid": 1, "abstract": null}).to_string(),
                json!({"corpusid": 2, "abstract": "Second abstract."}).to_string(),
            ],
        );
        let papers = write_lines(
            &tmp,
            "papers.jsonl",
            &[
                json!({"corpusid": 1, "title": "First", "authors": [{"name": "A"}]}).to_string(),
                json!({"corpusid": 2, "title": "Second", "authors": [{"name": "B"}],
                       "externalids": {"DOI": "10.2/b"}}).to_string(),
            ],
        );

        let index = Arc::new(RecordingIndex::default());
        let report = pipeline(index.clone())
            .ingest_s2ag(&abstracts, &papers, 10)
            .await
            .unwrap();
        assert_eq!(report.lines_read, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, 1);

        let docs = index.docs.lock().unwrap();
        let doc = &docs[&fingerprint("Second", "Second abstract.")];
        assert_eq!(doc.abstract_text, "Second abstract.");
        assert_eq!(doc.author_names, vec!["B"]);
        assert_eq!(doc.doi.as_deref(), Some("10.2/b"));
    }

    #[tokio::test]
    async fn test_s2ag_unequal_files_fail() {
        let tmp = TempDir::new().unwrap();
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[
                json!({"abstract": "a"}).to_string(),
                json!({"abstract": "b"}).to_string(),
            ],
        );
        let papers = write_lines(&tmp, "papers.jsonl", &[json!({"title": "A"}).to_string()]);

        let index = Arc::new(RecordingIndex::default());
        let err = pipeline(index.clone())
            .ingest_s2ag(&abstracts, &papers, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Misaligned { line: 2, .. }));
        // the aligned prefix was still indexed
        assert_eq!(index.docs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_commits_records_already_upserted() {
        let tmp = TempDir::new().unwrap();
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[
                json!({"abstract": "kept abstract"}).to_string(),
                json!({"abstract": "orphan"}).to_string(),
            ],
        );
        let papers = write_lines(&tmp, "papers.jsonl", &[json!({"title": "Kept"}).to_string()]);
        let idx_path = tmp.path().join("idx");

        {
            let index = Arc::new(FulltextIndex::create_or_open(&idx_path).unwrap());
            let err = pipeline(index.clone())
                .ingest_s2ag(&abstracts, &papers, 10)
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::Misaligned { line: 2, .. }));

            let resp = index.search(IndexQuery::MatchAll).await.unwrap();
            assert_eq!(resp.total, 1);
        }

        // survives reopening the on-disk index
        let reopened = FulltextIndex::create_or_open(&idx_path).unwrap();
        assert_eq!(reopened.count(), 1);
    }

    #[tokio::test]
    async fn test_s2ag_unequal_files_within_bound_are_fine() {
        let tmp = TempDir::new().unwrap();
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[
                json!({"abstract": "a"}).to_string(),
                json!({"abstract": "b"}).to_string(),
            ],
        );
        let papers = write_lines(&tmp, "papers.jsonl", &[json!({"title": "A"}).to_string()]);

        let report = pipeline(Arc::new(RecordingIndex::default()))
            .ingest_s2ag(&abstracts, &papers, 1)
            .await
            .unwrap();
        assert_eq!(report.lines_read, 1);
    }

    #[tokio::test]
    async fn test_s2ag_corpusid_mismatch_fails() {
        let tmp = TempDir::new().unwrap();
        let abstracts = write_lines(
            &tmp,
            "abstracts.jsonl",
            &[json!({"corpusid": 7, "abstract": "a"}).to_string()],
        );
        let papers = write_lines(
            &tmp,
            "papers.jsonl",
            &[json!({"corpusid": 8, "title": "A"}).to_string()],
        );

        let err = pipeline(Arc::new(RecordingIndex::default()))
            .ingest_s2ag(&abstracts, &papers, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Misaligned { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = pipeline(Arc::new(RecordingIndex::default()))
            .ingest_openalex(&tmp.path().join("absent.jsonl"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }

    #[tokio::test]
    async fn test_process_data_runs_both_sources() {
        let tmp = TempDir::new().unwrap();
        let files = DataFiles {
            openalex: write_lines(&tmp, "oa.jsonl", &[openalex_line("T1", "x")]),
            s2ag_abstracts: write_lines(
                &tmp,
                "abs.jsonl",
                &[json!({"abstract": "s2 text"}).to_string()],
            ),
            s2ag_papers: write_lines(
                &tmp,
                "papers.jsonl",
                &[json!({"title": "S2 title"}).to_string()],
            ),
        };

        let index = Arc::new(RecordingIndex::default());
        let reports = pipeline(index.clone()).process_data(&files, 1000).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].source, Source::OpenAlex);
        assert_eq!(reports[1].source, Source::S2ag);
        assert_eq!(index.docs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_index_record_by_tag() {
        let index = Arc::new(RecordingIndex::default());
        let p = pipeline(index.clone());

        let value: serde_json::Value = serde_json::from_str(&openalex_line("T1", "x")).unwrap();
        let outcome = p.index_record("openalex", value).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Indexed { id: fingerprint("T1", "x") });

        let outcome = p
            .index_record("s2ag", json!({"title": "No abstract", "abstract": null}))
            .await
            .unwrap();
        assert!(matches!(outcome, RecordOutcome::Skipped { .. }));
        assert_eq!(index.docs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_index_record_unknown_source() {
        let err = pipeline(Arc::new(RecordingIndex::default()))
            .index_record("crossref", json!({"title": "T"}))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Record(RawRecordError::UnknownSource(_))));
    }
}
