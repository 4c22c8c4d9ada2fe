//! CLI entry point for the research knowledge-graph construction and
//! progression engine: paper import, the extraction + matching
//! pipeline, and the four-stage research workflow.

mod commands;
mod config;
mod llm_client;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::workflow::WorkflowCommand;
use crate::config::CliContext;

#[derive(Debug, Parser)]
#[command(name = "agentic-kg", version, about = "Research knowledge-graph construction and progression engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch papers by DOI/arXiv id/S2 id/OpenAlex id and import them into the graph.
    Import {
        identifiers: Vec<String>,
        #[arg(long)]
        update_existing: bool,
    },
    /// Extract problems from a PDF and match them against the concept graph.
    Extract {
        pdf_path: std::path::PathBuf,
        #[arg(long)]
        paper_doi: Option<String>,
        #[arg(long, default_value = "unspecified")]
        domain: String,
    },
    /// Drive the ranking/continuation/evaluation/synthesis workflow.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let ctx = CliContext::build();

    match cli.command {
        Command::Import { identifiers, update_existing } => commands::import::run(&ctx, identifiers, update_existing).await,
        Command::Extract { pdf_path, paper_doi, domain } => commands::extract::run(&ctx, &pdf_path, paper_doi, domain).await,
        Command::Workflow { command } => commands::workflow::run(&ctx, command).await,
    }
}
