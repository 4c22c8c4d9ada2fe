//! `import`: fetch one or more papers from the acquisition layer and
//! upsert them into the repository via `Importer`.

use agentic_kg_core::acquisition::models::Identifier;
use agentic_kg_core::importer::{BatchResult, ImportOptions};

use crate::config::CliContext;

pub async fn run(ctx: &CliContext, identifiers: Vec<String>, update_existing: bool) -> Result<(), anyhow::Error> {
    let mut papers = Vec::with_capacity(identifiers.len());
    for raw in &identifiers {
        let identifier = Identifier::detect(raw)?;
        match ctx.kg.aggregator.fetch(&identifier).await {
            Ok(paper) => papers.push(paper),
            Err(err) => {
                tracing::warn!(identifier = %raw, error = %err, "failed to fetch paper, skipping");
            }
        }
    }

    if papers.is_empty() {
        anyhow::bail!("none of the given identifiers could be fetched from any source");
    }

    let options = ImportOptions { update_existing, ..ImportOptions::default() };
    let result: BatchResult = ctx.kg.importer.import_batch(papers, options, |done, total| {
        tracing::info!(done, total, "import progress");
    }).await;

    println!(
        "imported {}/{} papers ({} created, {} updated, {} skipped, {} failed)",
        result.created + result.updated,
        result.total,
        result.created,
        result.updated,
        result.skipped,
        result.failed
    );
    for (doi, error) in &result.errors {
        println!("  {doi}: {error}");
    }

    Ok(())
}
