//! `extract`: the extraction + matching pipeline as one command — PDF
//! text, segmentation, LLM-based problem extraction, embedding, and
//! immediate concept-matching for every extracted problem. This glue
//! is deliberately not part of `crates/core`: the crate only specifies
//! each stage as a trait/function, the way the teacher's `up` command
//! is what actually wires its runtime's independently-testable pieces
//! together.

use agentic_kg_core::extraction::embeddings::{problem_embedding_text, EmbeddingProvider};
use agentic_kg_core::extraction::pdf_extractor;
use agentic_kg_core::extraction::problem_extractor::{ExtractorConfig, ProblemExtractor};
use agentic_kg_core::extraction::segmenter::segment;
use agentic_kg_core::graph::models::{
    Constraint, Evidence, ExtractionMetadata, MentionId, Problem, ProblemId, ProblemMention, ProblemStatus, Relation, ReviewStatus,
};
use agentic_kg_core::matching::workflow::MatchOutcome;
use chrono::Utc;

use crate::config::CliContext;

pub async fn run(ctx: &CliContext, pdf_path: &std::path::Path, paper_doi: Option<String>, domain: String) -> Result<(), anyhow::Error> {
    let llm = ctx
        .llm
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no LLM backend configured (set OPENROUTER_API_KEY or OPENAI_API_KEY)"))?;
    let matching_workflow = ctx.matching_workflow().expect("llm was just checked present above");

    let bytes = std::fs::read(pdf_path)?;
    let extracted_text = pdf_extractor::extract(&bytes)?;
    if extracted_text.is_scanned {
        anyhow::bail!("{} appears to be a scanned/image-only PDF with no extractable text layer", pdf_path.display());
    }

    let sections = segment(&extracted_text.full_text());
    let extractor = ProblemExtractor::new(llm.clone(), ExtractorConfig::default());
    let found = extractor.extract_all(&sections).await?;

    println!("extracted {} candidate problem(s) from {}", found.len(), pdf_path.display());

    for (section_idx, extracted) in found {
        let section = &sections[section_idx];
        let now = Utc::now();
        let embedding_text = problem_embedding_text(&domain, &extracted.statement, &[]);
        let embedding = llm.embed_one(&embedding_text).await?;

        let problem = Problem {
            id: ProblemId::new(),
            statement: extracted.statement.clone(),
            domain: domain.clone(),
            status: ProblemStatus::Open,
            assumptions: Vec::<String>::new(),
            constraints: Vec::<Constraint>::new(),
            datasets: Vec::new(),
            metrics: Vec::new(),
            baselines: Vec::new(),
            evidence: Evidence {
                source_doi: paper_doi.clone(),
                source_title: section.title.clone(),
                section: section.title.clone(),
                quoted_text: extracted.quoted_text.clone(),
            },
            extraction_metadata: ExtractionMetadata {
                model: "http-llm-client".to_string(),
                version: agentic_kg_core::extraction::prompts::PROMPT_VERSION.to_string(),
                confidence_score: extracted.confidence,
                reviewed: false,
            },
            embedding: Some(embedding.clone()),
            version: 1,
            related_problem_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        ctx.kg.repository.put_problem(problem.clone()).await?;

        if let Some(doi) = &paper_doi {
            ctx.kg.repository.put_relation(Relation::ExtractedFrom { problem: problem.id, paper_doi: doi.clone() }).await?;
        }

        let mention = ProblemMention {
            id: MentionId::new(),
            statement: extracted.statement,
            embedding,
            paper_doi: paper_doi.clone(),
            domain: domain.clone(),
            review_status: ReviewStatus::Unreviewed,
            concept_id: None,
        };
        ctx.kg.repository.put_mention(mention.clone()).await?;

        let (outcome, _trace) = matching_workflow.run(mention, uuid::Uuid::new_v4(), now).await?;
        match outcome {
            MatchOutcome::Linked(concept_id) => println!("  {} -> linked to existing concept {concept_id}", problem.id),
            MatchOutcome::CreatedNew(concept_id) => println!("  {} -> created new concept {concept_id}", problem.id),
            MatchOutcome::Escalated(review_id) => println!("  {} -> escalated for human review ({review_id})", problem.id),
        }
    }

    Ok(())
}
