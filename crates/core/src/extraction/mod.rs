//! PDF extraction, section segmentation, problem extraction, and
//! embedding (§4.10–§4.13).

pub mod embeddings;
pub mod pdf_extractor;
pub mod problem_extractor;
pub mod prompts;
pub mod segmenter;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pdf extraction failed: {0}")]
    PdfExtraction(String),
    #[error("llm call failed: {0}")]
    Llm(String),
    #[error("embedding call failed: {0}")]
    Embedding(String),
    #[error("extracted problem failed validation: {0}")]
    Validation(String),
}
