//! Per-source record → unified `Paper`, and the associative/idempotent
//! merge combiner used by both the aggregator and the importer (§4.7).

use chrono::Utc;
use unicode_normalization::UnicodeNormalization;

use super::models::{RawArxivEntry, RawOpenAlexWork, RawRecord, RawS2Paper};
use super::AcquisitionError;
use crate::graph::models::{AuthorRef, Paper, PaperSource};

/// Strip the `10.xxxx/...` DOI out of a string that might carry a
/// `doi.org/` prefix or surrounding whitespace; return `None` if the
/// result doesn't look like a DOI (invalid identifiers are normalized
/// away, not rejected, per §3).
pub fn clean_doi(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches("https://doi.org/")
        .trim_start_matches("http://doi.org/")
        .trim_start_matches("doi:");
    if trimmed.starts_with("10.") && trimmed.contains('/') {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Validate/clean an arXiv identifier against the new (`YYMM.NNNNN[vN]`)
/// or old (`category/NNNNNNN[vN]`) formats.
pub fn clean_arxiv_id(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches("arXiv:")
        .trim_start_matches("arxiv:");
    let without_version = trimmed.split('v').next().unwrap_or(trimmed);

    let is_new_format = without_version.len() == 9
        && without_version.as_bytes()[4] == b'.'
        && without_version[..4].chars().all(|c| c.is_ascii_digit())
        && without_version[5..].chars().all(|c| c.is_ascii_digit());

    let is_old_format = without_version
        .split_once('/')
        .map(|(cat, num)| !cat.is_empty() && num.len() == 7 && num.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);

    if is_new_format || is_old_format {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// NFC-normalize and collapse whitespace, the way titles/abstracts
/// pulled from inconsistent upstream encodings need cleaning before
/// storage.
fn clean_text(raw: &str) -> String {
    raw.nfc().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reconstruct plain text from an inverted index (`{word: [positions]}`),
/// the shape OpenAlex returns abstracts in.
pub fn reconstruct_abstract_from_inverted_index(
    inverted: &std::collections::HashMap<String, Vec<u32>>,
) -> String {
    let mut positioned: Vec<(u32, &str)> = Vec::new();
    for (word, positions) in inverted {
        for &pos in positions {
            positioned.push((pos, word.as_str()));
        }
    }
    positioned.sort_by_key(|(pos, _)| *pos);
    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn empty_authors() -> Vec<AuthorRef> {
    Vec::new()
}

/// Normalize a raw Semantic Scholar record into a `Paper`. Author
/// `AuthorRef`s here carry placeholder internal ids; the importer is
/// responsible for resolving them against real `Author` nodes.
pub fn normalize_s2(raw: &RawS2Paper) -> Result<Paper, AcquisitionError> {
    let doi = raw.external_ids.as_ref().and_then(|e| e.doi.as_deref()).and_then(clean_doi);
    let arxiv_id = raw
        .external_ids
        .as_ref()
        .and_then(|e| e.arxiv.as_deref())
        .and_then(clean_arxiv_id);

    Ok(Paper {
        doi,
        title: clean_text(&raw.title),
        abstract_text: raw.abstract_text.as_deref().map(clean_text),
        authors: empty_authors(),
        raw_author_names: raw.authors.iter().map(|a| a.name.clone()).collect(),
        year: raw.year,
        venue: None,
        arxiv_id,
        openalex_id: None,
        s2_id: Some(raw.paper_id.clone()),
        pdf_url: raw.open_access_pdf.as_ref().map(|p| p.url.clone()),
        is_open_access: raw.open_access_pdf.is_some(),
        citation_count: raw.citation_count.unwrap_or(0),
        fields_of_study: Vec::new(),
        source: PaperSource::S2,
        retrieved_at: Utc::now(),
    })
}

/// Normalize a raw arXiv Atom entry into a `Paper`.
pub fn normalize_arxiv(raw: &RawArxivEntry) -> Result<Paper, AcquisitionError> {
    let arxiv_id = clean_arxiv_id(&raw.id);
    let year = raw.published.get(0..4).and_then(|y| y.parse::<i32>().ok());

    Ok(Paper {
        doi: None,
        title: clean_text(&raw.title),
        abstract_text: Some(clean_text(&raw.summary)),
        authors: empty_authors(),
        raw_author_names: raw.authors.clone(),
        year,
        venue: Some("arXiv".to_string()),
        arxiv_id,
        openalex_id: None,
        s2_id: None,
        pdf_url: raw.pdf_url.clone(),
        is_open_access: true,
        citation_count: 0,
        fields_of_study: Vec::new(),
        source: PaperSource::Arxiv,
        retrieved_at: Utc::now(),
    })
}

/// Normalize a raw OpenAlex work into a `Paper`.
pub fn normalize_openalex(raw: &RawOpenAlexWork) -> Result<Paper, AcquisitionError> {
    let doi = raw.doi.as_deref().and_then(clean_doi);

    Ok(Paper {
        doi,
        title: raw.title.as_deref().map(clean_text).unwrap_or_default(),
        abstract_text: None,
        authors: empty_authors(),
        raw_author_names: raw.authorships.iter().map(|a| a.author.display_name.clone()).collect(),
        year: raw.publication_year,
        venue: None,
        arxiv_id: None,
        openalex_id: Some(raw.id.clone()),
        s2_id: None,
        pdf_url: raw.open_access.as_ref().and_then(|oa| oa.oa_url.clone()),
        is_open_access: raw.open_access.as_ref().map(|oa| oa.oa_url.is_some()).unwrap_or(false),
        citation_count: raw.cited_by_count.unwrap_or(0),
        fields_of_study: Vec::new(),
        source: PaperSource::OpenAlex,
        retrieved_at: Utc::now(),
    })
}

pub fn normalize(record: &RawRecord) -> Result<Paper, AcquisitionError> {
    match record {
        RawRecord::S2(r) => normalize_s2(r),
        RawRecord::Arxiv(r) => normalize_arxiv(r),
        RawRecord::OpenAlex(r) => normalize_openalex(r),
    }
}

/// Merge two `Paper` records believed to describe the same work
/// (same DOI or same arXiv id), field by field. Earlier non-empty value
/// wins except: `citation_count` → max, `authors` → longest list,
/// `is_open_access` → OR. This function is associative and idempotent,
/// so `merge(merge(a, b), c) == merge(a, merge(b, c))` and
/// `merge(a, a) == a`, meaning aggregation order never affects the
/// result (§4.7).
pub fn merge(a: Paper, b: Paper) -> Paper {
    fn pick_str(a: Option<String>, b: Option<String>) -> Option<String> {
        a.or(b)
    }

    Paper {
        doi: pick_str(a.doi, b.doi),
        title: if a.title.is_empty() { b.title } else { a.title },
        abstract_text: pick_str(a.abstract_text, b.abstract_text),
        authors: if a.authors.len() >= b.authors.len() { a.authors } else { b.authors },
        raw_author_names: if a.raw_author_names.len() >= b.raw_author_names.len() {
            a.raw_author_names
        } else {
            b.raw_author_names
        },
        year: a.year.or(b.year),
        venue: pick_str(a.venue, b.venue),
        arxiv_id: pick_str(a.arxiv_id, b.arxiv_id),
        openalex_id: pick_str(a.openalex_id, b.openalex_id),
        s2_id: pick_str(a.s2_id, b.s2_id),
        pdf_url: pick_str(a.pdf_url, b.pdf_url),
        is_open_access: a.is_open_access || b.is_open_access,
        citation_count: a.citation_count.max(b.citation_count),
        fields_of_study: if a.fields_of_study.is_empty() { b.fields_of_study } else { a.fields_of_study },
        source: a.source,
        retrieved_at: a.retrieved_at.min(b.retrieved_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_doi_strips_url_prefix() {
        assert_eq!(clean_doi("https://doi.org/10.1234/abcd"), Some("10.1234/abcd".to_string()));
        assert_eq!(clean_doi("not a doi"), None);
    }

    #[test]
    fn clean_arxiv_id_accepts_new_and_old_formats() {
        assert_eq!(clean_arxiv_id("arXiv:2301.01234"), Some("2301.01234".to_string()));
        assert_eq!(clean_arxiv_id("2301.01234v2"), Some("2301.01234v2".to_string()));
        assert_eq!(clean_arxiv_id("cs.LG/0501001"), Some("cs.LG/0501001".to_string()));
        assert_eq!(clean_arxiv_id("garbage"), None);
    }

    #[test]
    fn reconstruct_inverted_index_orders_by_position() {
        let mut idx = std::collections::HashMap::new();
        idx.insert("world".to_string(), vec![1]);
        idx.insert("hello".to_string(), vec![0]);
        assert_eq!(reconstruct_abstract_from_inverted_index(&idx), "hello world");
    }

    fn paper(doi: Option<&str>, citation_count: u32, authors: usize) -> Paper {
        Paper {
            doi: doi.map(String::from),
            title: "T".into(),
            abstract_text: None,
            authors: (0..authors)
                .map(|i| AuthorRef { author_id: crate::graph::models::AuthorId::new(), position: i as u32 })
                .collect(),
            raw_author_names: vec![],
            year: None,
            venue: None,
            arxiv_id: None,
            openalex_id: None,
            s2_id: None,
            pdf_url: None,
            is_open_access: false,
            citation_count,
            fields_of_study: vec![],
            source: PaperSource::Manual,
            retrieved_at: Utc::now(),
        }
    }

    #[test]
    fn merge_takes_max_citation_count_and_longest_authors() {
        let a = paper(Some("10.1/x"), 5, 1);
        let b = paper(Some("10.1/x"), 10, 3);
        let merged = merge(a, b);
        assert_eq!(merged.citation_count, 10);
        assert_eq!(merged.authors.len(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = paper(Some("10.1/x"), 5, 2);
        let merged = merge(a.clone(), a.clone());
        assert_eq!(merged.doi, a.doi);
        assert_eq!(merged.citation_count, a.citation_count);
    }
}
