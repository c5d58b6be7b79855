use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apis::openalex::OpenAlexWork;
use crate::apis::semantic_scholar::S2Paper;

/// Which ingestion branch produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    OpenAlex,
    S2ag,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::OpenAlex => "openalex",
            Source::S2ag => "s2ag",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openalex" => Ok(Source::OpenAlex),
            "s2ag" => Ok(Source::S2ag),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// The unified document shape every source is mapped into before indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub author_names: Vec<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    #[serde(default)]
    pub cited_by_count: u64,
    pub rct_score: f64,
    pub source: Source,
}

/// A raw record as read from one of the sources, tagged by origin.
#[derive(Debug, Clone)]
pub enum RawRecord {
    OpenAlex(OpenAlexWork),
    /// An S2AG paper with its companion abstract already merged in.
    S2ag(S2Paper),
}

impl RawRecord {
    pub fn source(&self) -> Source {
        match self {
            RawRecord::OpenAlex(_) => Source::OpenAlex,
            RawRecord::S2ag(_) => Source::S2ag,
        }
    }

    /// Build a raw record from a source tag and an untyped JSON object.
    pub fn from_tagged(tag: &str, value: serde_json::Value) -> Result<Self, RawRecordError> {
        match tag.parse::<Source>()? {
            Source::OpenAlex => Ok(RawRecord::OpenAlex(serde_json::from_value(value)?)),
            Source::S2ag => Ok(RawRecord::S2ag(serde_json::from_value(value)?)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RawRecordError {
    #[error(transparent)]
    UnknownSource(#[from] UnknownSource),
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parse() {
        assert_eq!("openalex".parse::<Source>(), Ok(Source::OpenAlex));
        assert_eq!(" S2AG ".parse::<Source>(), Ok(Source::S2ag));
        assert_eq!(
            "crossref".parse::<Source>(),
            Err(UnknownSource("crossref".to_string()))
        );
    }

    #[test]
    fn test_canonical_record_document_shape() {
        let record = CanonicalRecord {
            title: "T1".to_string(),
            abstract_text: "x".to_string(),
            author_names: vec!["Ada".to_string()],
            publication_year: Some(2020),
            doi: Some("10.1/x".to_string()),
            cited_by_count: 3,
            rct_score: 1.5,
            source: Source::OpenAlex,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["abstract"], "x");
        assert_eq!(json["authorNames"][0], "Ada");
        assert_eq!(json["publicationYear"], 2020);
        assert_eq!(json["citedByCount"], 3);
        assert_eq!(json["rctScore"], 1.5);
        assert_eq!(json["source"], "openalex");
    }

    #[test]
    fn test_from_tagged_rejects_unknown_source() {
        let err = RawRecord::from_tagged("pubmed", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, RawRecordError::UnknownSource(_)));
    }

    #[test]
    fn test_from_tagged_dispatches() {
        let raw = RawRecord::from_tagged("s2ag", serde_json::json!({"title": "A"})).unwrap();
        assert_eq!(raw.source(), Source::S2ag);
    }
}
