//! Raw per-source record types and identifier validation.
//!
//! Each source client deserializes directly into its own `Raw*` type
//! (one per source, since the three upstream APIs disagree on field
//! names and nesting) before `normalizer` collapses them into the
//! shared `graph::models::Paper` shape.

use serde::{Deserialize, Serialize};

use super::{AcquisitionError, Source};

/// Canonical identifier kinds a caller can search by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Doi(String),
    Arxiv(String),
    SemanticScholarId(String),
    OpenAlexId(String),
}

impl Identifier {
    /// Detect the identifier kind from a bare string, the way a client
    /// dispatches an incoming lookup request to the right query shape.
    pub fn detect(raw: &str) -> Result<Self, AcquisitionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AcquisitionError::Validation("empty identifier".into()));
        }
        if let Some(rest) = trimmed.strip_prefix("arXiv:").or_else(|| trimmed.strip_prefix("arxiv:")) {
            return Ok(Identifier::Arxiv(rest.to_string()));
        }
        if trimmed.starts_with("10.") && trimmed.contains('/') {
            return Ok(Identifier::Doi(trimmed.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("W") {
            if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
                return Ok(Identifier::OpenAlexId(trimmed.to_string()));
            }
        }
        if trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Identifier::SemanticScholarId(trimmed.to_string()));
        }
        Err(AcquisitionError::Validation(format!(
            "unrecognized identifier format: {trimmed}"
        )))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Doi(s)
            | Identifier::Arxiv(s)
            | Identifier::SemanticScholarId(s)
            | Identifier::OpenAlexId(s) => s,
        }
    }
}

/// Raw record as returned by the Semantic Scholar Graph API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawS2Paper {
    #[serde(rename = "paperId")]
    pub paper_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub authors: Vec<RawS2Author>,
    #[serde(rename = "externalIds")]
    pub external_ids: Option<RawS2ExternalIds>,
    #[serde(rename = "citationCount")]
    pub citation_count: Option<u32>,
    #[serde(rename = "openAccessPdf")]
    pub open_access_pdf: Option<RawS2Pdf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawS2Author {
    #[serde(rename = "authorId")]
    pub author_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawS2ExternalIds {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "ArXiv")]
    pub arxiv: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawS2Pdf {
    pub url: String,
}

/// Raw record as returned by the arXiv Atom API (already flattened from
/// XML by the client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
}

/// Raw record as returned by the OpenAlex Works API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub authorships: Vec<RawOpenAlexAuthorship>,
    pub cited_by_count: Option<u32>,
    pub open_access: Option<RawOpenAlexOpenAccess>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpenAlexAuthorship {
    pub author: RawOpenAlexAuthor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpenAlexAuthor {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpenAlexOpenAccess {
    pub oa_url: Option<String>,
}

/// Tags a raw record with the source it came from, for the normalizer's
/// merge/precedence logic.
#[derive(Debug, Clone)]
pub enum RawRecord {
    S2(RawS2Paper),
    Arxiv(RawArxivEntry),
    OpenAlex(RawOpenAlexWork),
}

impl RawRecord {
    pub fn source(&self) -> Source {
        match self {
            RawRecord::S2(_) => Source::SemanticScholar,
            RawRecord::Arxiv(_) => Source::Arxiv,
            RawRecord::OpenAlex(_) => Source::OpenAlex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_doi() {
        assert_eq!(
            Identifier::detect("10.1234/abcd.5678").unwrap(),
            Identifier::Doi("10.1234/abcd.5678".to_string())
        );
    }

    #[test]
    fn detects_arxiv_with_prefix() {
        assert_eq!(
            Identifier::detect("arXiv:2301.01234").unwrap(),
            Identifier::Arxiv("2301.01234".to_string())
        );
    }

    #[test]
    fn detects_openalex_work_id() {
        assert_eq!(
            Identifier::detect("W2741809807").unwrap(),
            Identifier::OpenAlexId("W2741809807".to_string())
        );
    }

    #[test]
    fn rejects_empty_and_unknown() {
        assert!(Identifier::detect("").is_err());
        assert!(Identifier::detect("not an id at all").is_err());
    }
}
