//! Persisted state layout (§6): node/relation labels, vector-index
//! declarations, and a schema version the repository implementation is
//! expected to migrate against. This module only declares the shape;
//! applying it is the concrete repository's job.

/// Bumped whenever a node/relation shape changes in a way that requires
/// a migration in a concrete `Repository` backend.
pub const SCHEMA_VERSION: u32 = 1;

/// Node labels used by the property graph.
pub mod labels {
    pub const PAPER: &str = "Paper";
    pub const AUTHOR: &str = "Author";
    pub const PROBLEM: &str = "Problem";
    pub const PROBLEM_MENTION: &str = "ProblemMention";
    pub const PROBLEM_CONCEPT: &str = "ProblemConcept";
    pub const PENDING_REVIEW: &str = "PendingReview";
}

/// Relation type names, matching §3's Relations list.
pub mod relation_types {
    pub const EXTRACTED_FROM: &str = "EXTRACTED_FROM";
    pub const AUTHORED_BY: &str = "AUTHORED_BY";
    pub const INSTANCE_OF: &str = "INSTANCE_OF";
    pub const CITES: &str = "CITES";
    pub const EXTENDS: &str = "EXTENDS";
    pub const CONTRADICTS: &str = "CONTRADICTS";
    pub const DEPENDS_ON: &str = "DEPENDS_ON";
    pub const REFRAMES: &str = "REFRAMES";
    pub const IN_DOMAIN: &str = "IN_DOMAIN";
}

/// Declaration of a vector index a concrete repository backend must
/// maintain to satisfy `Repository::query_similar_concepts`.
#[derive(Debug, Clone, Copy)]
pub struct VectorIndexSpec {
    pub label: &'static str,
    pub property: &'static str,
    pub dimension: usize,
    pub similarity: SimilarityFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityFunction {
    Cosine,
}

pub const PROBLEM_CONCEPT_EMBEDDING_INDEX: VectorIndexSpec = VectorIndexSpec {
    label: labels::PROBLEM_CONCEPT,
    property: "embedding",
    dimension: super::models::EMBEDDING_DIM,
    similarity: SimilarityFunction::Cosine,
};
