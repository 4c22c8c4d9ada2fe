//! PDF bytes → cleaned per-page text (§4.10).

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::ExtractionError;

#[derive(Debug, Clone)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub pages: Vec<Page>,
    pub total_pages: u32,
    /// Flagged when total text across all pages is under 100 chars
    /// despite a non-zero page count; the caller decides whether to
    /// reject (likely an image-only/scanned PDF with no text layer).
    pub is_scanned: bool,
    pub metadata: PdfMetadata,
}

impl ExtractedText {
    pub fn full_text(&self) -> String {
        self.pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}

struct Cleaner {
    header_footer_patterns: Vec<Regex>,
    dehyphenate: Regex,
}

impl Cleaner {
    fn new() -> Self {
        let patterns = [
            r"(?m)^\s*\d+\s*$",
            r"(?mi)^\s*arXiv:\S+\s*$",
            r"(?mi)^\s*page \d+ of \d+\s*$",
            r"(?mi)^\s*proceedings of .+$",
            r"(?mi)^\s*©\s*\d{4}.*$",
        ];
        Self {
            header_footer_patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            dehyphenate: Regex::new(r"(\w)-\n\s*([a-z])").unwrap(),
        }
    }

    fn clean_page(&self, raw: &str) -> String {
        let nfc: String = raw.nfc().collect();
        let dehyphenated = self.dehyphenate.replace_all(&nfc, "$1$2").to_string();

        let mut without_boilerplate = dehyphenated.clone();
        for pattern in &self.header_footer_patterns {
            without_boilerplate = pattern.replace_all(&without_boilerplate, "").to_string();
        }

        without_boilerplate.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Extract and clean text from PDF bytes. Pages are post-processed with
/// NFC normalization, header/footer stripping, dehyphenation, and
/// whitespace collapse.
pub fn extract(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let raw_text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::PdfExtraction(e.to_string()))?;

    let cleaner = Cleaner::new();
    // `pdf_extract` joins pages with form-feed characters.
    let raw_pages: Vec<&str> = raw_text.split('\x0c').collect();
    let total_pages = raw_pages.len() as u32;

    let pages: Vec<Page> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, raw)| Page { page_number: i as u32 + 1, text: cleaner.clean_page(raw) })
        .collect();

    let total_chars: usize = pages.iter().map(|p| p.text.len()).sum();
    let is_scanned = total_pages >= 1 && total_chars < 100;

    Ok(ExtractedText { pages, total_pages, is_scanned, metadata: PdfMetadata::default() })
}
