//! The property-graph data model (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_id!(AuthorId);
newtype_id!(ProblemId);
newtype_id!(MentionId);
newtype_id!(ConceptId);
newtype_id!(ReviewId);

/// Which bibliographic source (or non-source) a `Paper` originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSource {
    S2,
    Arxiv,
    OpenAlex,
    Cache,
    /// Created directly (not via the acquisition layer), e.g. via a
    /// manual ingest endpoint.
    Manual,
}

/// A single (position, author) pairing on a paper, enforcing I2 at the
/// type level: a `Vec` indexed by position rather than a set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRef {
    pub author_id: AuthorId,
    pub position: u32,
}

/// Primary key is the DOI (I1: unique and immutable once set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub doi: Option<String>,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<AuthorRef>,
    /// Author display names in source order, as returned by the
    /// acquisition layer, not yet resolved to `AuthorId`s. The importer
    /// consumes this to resolve/create `Author` nodes and populate
    /// `authors` at upsert time; it is empty on a `Paper` read back from
    /// the repository.
    pub raw_author_names: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub arxiv_id: Option<String>,
    pub openalex_id: Option<String>,
    pub s2_id: Option<String>,
    pub pdf_url: Option<String>,
    pub is_open_access: bool,
    pub citation_count: u32,
    pub fields_of_study: Vec<String>,
    pub source: PaperSource,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub orcid: Option<String>,
    pub affiliations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemStatus {
    Open,
    InProgress,
    Resolved,
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    Computational,
    Data,
    Methodological,
    Theoretical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub text: String,
    pub constraint_type: ConstraintType,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source_doi: Option<String>,
    pub source_title: String,
    pub section: String,
    pub quoted_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub model: String,
    pub version: String,
    pub confidence_score: f32,
    pub reviewed: bool,
}

/// Validated 1536-dimensional embedding (I6: all embeddings are
/// 1536-dimensional and finite).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

#[derive(Debug, thiserror::Error, Clone)]
pub enum EmbeddingError {
    #[error("embedding has {0} dimensions, expected {EMBEDDING_DIM}")]
    WrongDimension(usize),
    #[error("embedding contains a non-finite value at index {0}")]
    NonFinite(usize),
}

pub const EMBEDDING_DIM: usize = 1536;

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::WrongDimension(values.len()));
        }
        if let Some((i, _)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite(i));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity between two embeddings of equal (validated)
    /// dimensionality.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f32 = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = other.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub statement: String,
    pub domain: String,
    pub status: ProblemStatus,
    pub assumptions: Vec<String>,
    pub constraints: Vec<Constraint>,
    pub datasets: Vec<String>,
    pub metrics: Vec<String>,
    pub baselines: Vec<String>,
    pub evidence: Evidence,
    pub extraction_metadata: ExtractionMetadata,
    pub embedding: Option<Embedding>,
    /// I5: increments on every write.
    pub version: u64,
    /// Derived, non-authoritative projection maintained alongside the
    /// typed relations for the Continuation agent's one-hop traversal.
    pub related_problem_ids: Vec<ProblemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Unreviewed,
    Pending,
    Escalated,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemMention {
    pub id: MentionId,
    pub statement: String,
    pub embedding: Embedding,
    pub paper_doi: Option<String>,
    pub domain: String,
    pub review_status: ReviewStatus,
    pub concept_id: Option<ConceptId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptStatus {
    Active,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemConcept {
    pub id: ConceptId,
    pub canonical_statement: String,
    pub domain: String,
    pub embedding: Embedding,
    /// I4: equals the incoming INSTANCE_OF degree.
    pub mention_count: u64,
    pub status: ConceptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewPriority {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationReason {
    LowConfidence,
    ConsensusNotReached,
    HighImpactDomain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub concept_id: ConceptId,
    pub similarity: f32,
    pub citation_boost: f32,
    pub final_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewResolutionKind {
    Link,
    PromoteNewConcept,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResolution {
    pub kind: ReviewResolutionKind,
    pub concept_id: Option<ConceptId>,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub id: ReviewId,
    pub mention_ref: MentionId,
    pub suggested_concepts: Vec<MatchCandidate>,
    pub priority: ReviewPriority,
    pub escalation_reason: EscalationReason,
    pub sla_deadline: DateTime<Utc>,
    pub resolution: Option<ReviewResolution>,
}

/// Typed sub-kinds for the Problem→Problem relation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemRelationKind {
    Extends,
    Contradicts,
    DependsOn,
    Reframes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Relation {
    ExtractedFrom { problem: ProblemId, paper_doi: String },
    AuthoredBy { paper_doi: String, author: AuthorId, position: u32 },
    InstanceOf { mention: MentionId, concept: ConceptId },
    Cites { citing_doi: String, cited_doi: String },
    ProblemToProblem {
        from: ProblemId,
        to: ProblemId,
        kind: ProblemRelationKind,
        confidence: f32,
    },
    InDomain { problem: ProblemId, domain: String },
}
