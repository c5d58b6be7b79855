use thiserror::Error;

use crate::apis::openalex::OpenAlexWork;
use crate::apis::semantic_scholar::{S2AbstractLine, S2Paper};
use crate::rct::RctScorer;
use crate::record::{CanonicalRecord, RawRecord};

/// Why a record was left out of the index. Skips are counted, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkipReason {
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("no abstract")]
    MissingAbstract,
    #[error("no authors")]
    NoAuthors,
    #[error("empty title")]
    EmptyTitle,
    #[error("empty abstract")]
    EmptyAbstract,
}

/// OpenAlex works need an abstract index and at least one authorship.
pub fn admit_openalex(work: &OpenAlexWork) -> Result<(), SkipReason> {
    if work.abstract_inverted_index.is_none() {
        return Err(SkipReason::MissingAbstract);
    }
    if !work.has_authors() {
        return Err(SkipReason::NoAuthors);
    }
    Ok(())
}

/// Merge an S2AG abstracts line into its paired paper, rejecting null abstracts.
pub fn admit_s2ag(abstract_line: S2AbstractLine, mut paper: S2Paper) -> Result<RawRecord, SkipReason> {
    let abstract_text = abstract_line.abstract_text.ok_or(SkipReason::MissingAbstract)?;
    paper.abstract_text = Some(abstract_text);
    Ok(RawRecord::S2ag(paper))
}

/// Map a raw record into the canonical shape, dispatching on its source.
pub fn normalize(raw: RawRecord, scorer: &dyn RctScorer) -> Result<CanonicalRecord, SkipReason> {
    let source = raw.source();
    let fields = match raw {
        RawRecord::OpenAlex(work) => from_openalex(work),
        RawRecord::S2ag(paper) => from_s2ag(paper),
    };

    if fields.title.trim().is_empty() {
        return Err(SkipReason::EmptyTitle);
    }
    if fields.abstract_text.trim().is_empty() {
        return Err(SkipReason::EmptyAbstract);
    }

    let rct_score = scorer.score(&fields.title, &fields.abstract_text);
    Ok(CanonicalRecord {
        title: fields.title,
        abstract_text: fields.abstract_text,
        author_names: fields.author_names,
        publication_year: fields.publication_year,
        doi: fields.doi,
        cited_by_count: fields.cited_by_count,
        rct_score,
        source,
    })
}

struct Fields {
    title: String,
    abstract_text: String,
    author_names: Vec<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    cited_by_count: u64,
}

fn from_openalex(work: OpenAlexWork) -> Fields {
    Fields {
        abstract_text: work
            .abstract_inverted_index
            .as_ref()
            .map(|idx| idx.reconstruct())
            .unwrap_or_default(),
        author_names: work.author_names(),
        title: work.title.unwrap_or_default(),
        publication_year: work.publication_year,
        doi: work.doi,
        cited_by_count: work.cited_by_count.unwrap_or(0),
    }
}

fn from_s2ag(paper: S2Paper) -> Fields {
    Fields {
        author_names: paper.author_names(),
        doi: paper.doi(),
        title: paper.title.unwrap_or_default(),
        abstract_text: paper.abstract_text.unwrap_or_default(),
        publication_year: paper.year,
        cited_by_count: paper.citation_count.unwrap_or(0),
    }
}
