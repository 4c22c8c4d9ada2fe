//! `workflow`: drive the ranking → continuation → evaluation →
//! synthesis engine directly from the CLI, the way the teacher's `up`
//! command owns the runtime lifecycle in-process. `resume` takes a
//! decision straight from CLI flags for a human sitting at the
//! terminal; `serve` instead stands up `agentic-kg-approval-relay`'s
//! signed webhook in the same process and blocks on it at every
//! checkpoint, for an out-of-process approver.

use std::sync::Arc;
use std::time::Duration;

use agentic_kg_approval_relay::session::{SessionKind, SessionManager, SessionStatus};
use agentic_kg_approval_relay::webhook::{router, HmacVerifier, RelayState};
use agentic_kg_approval_relay::RelayConfig;
use agentic_kg_core::graph::models::ProblemStatus;
use agentic_kg_core::workflow::checkpoint::{CheckpointType, Decision, DecisionKind};
use agentic_kg_core::workflow::engine::StartParams;
use agentic_kg_core::workflow::state::{RunId, RunStatus};
use clap::Subcommand;

use crate::config::CliContext;

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// Start a new run, pausing at its first required checkpoint (or
    /// running straight through if no checkpoint is required).
    Start {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        candidate_limit: Option<usize>,
    },
    /// Show a run's current state.
    Show { run_id: RunId },
    /// List every known run.
    List,
    /// Resume a paused run past the given checkpoint.
    Resume {
        run_id: RunId,
        #[arg(long, value_enum)]
        checkpoint: CheckpointArg,
        #[command(subcommand)]
        decision: DecisionCommand,
    },
    /// Cancel a run; any further resume attempt is rejected.
    Cancel { run_id: RunId },
    /// Start a run and drive it to completion, taking every checkpoint
    /// decision from the signed webhook relay instead of CLI flags.
    Serve {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        candidate_limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CheckpointArg {
    SelectProblem,
    ApproveProposal,
    ReviewEvaluation,
}

impl From<CheckpointArg> for CheckpointType {
    fn from(value: CheckpointArg) -> Self {
        match value {
            CheckpointArg::SelectProblem => CheckpointType::SelectProblem,
            CheckpointArg::ApproveProposal => CheckpointType::ApproveProposal,
            CheckpointArg::ReviewEvaluation => CheckpointType::ReviewEvaluation,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum DecisionCommand {
    /// Proceed unchanged.
    Approve,
    /// Short-circuit the run to completion without proceeding.
    Reject {
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Apply a JSON-merge-patch to the checkpoint's data before proceeding.
    Edit {
        /// JSON-merge-patch document, e.g. '{"title": "revised"}'
        #[arg(long)]
        data: String,
    },
}

impl DecisionCommand {
    fn into_decision(self) -> Result<Decision, anyhow::Error> {
        Ok(match self {
            DecisionCommand::Approve => Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None },
            DecisionCommand::Reject { feedback } => Decision { kind: DecisionKind::Reject, feedback, edited_data: None },
            DecisionCommand::Edit { data } => Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(serde_json::from_str(&data)?) },
        })
    }
}

pub async fn run(ctx: &CliContext, command: WorkflowCommand) -> Result<(), anyhow::Error> {
    let engine = ctx.workflow_engine()?;

    match command {
        WorkflowCommand::Start { domain, candidate_limit } => {
            let params = StartParams { domain_filter: domain, status_filter: Some(ProblemStatus::Open), candidate_limit };
            let run_id = engine.start(params).await?;
            println!("started run {run_id}");
        }
        WorkflowCommand::Show { run_id } => {
            let record = engine.get_state(run_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        WorkflowCommand::List => {
            let runs = engine.list().await?;
            for record in runs {
                println!("{}  {:?}  pending={:?}", record.run_id, record.status, record.pending_checkpoint);
            }
        }
        WorkflowCommand::Resume { run_id, checkpoint, decision } => {
            let record = engine.resume(run_id, checkpoint.into(), decision.into_decision()?).await?;
            println!("run {} is now {:?} (pending={:?})", record.run_id, record.status, record.pending_checkpoint);
        }
        WorkflowCommand::Cancel { run_id } => {
            engine.cancel(run_id).await?;
            println!("cancelled run {run_id}");
        }
        WorkflowCommand::Serve { domain, candidate_limit } => {
            serve(&engine, domain, candidate_limit).await?;
        }
    }

    Ok(())
}

/// Start a run and resolve every checkpoint it pauses at through a
/// freshly-started relay webhook, polling the session it creates until
/// an out-of-process caller POSTs a signed decision.
async fn serve(engine: &agentic_kg_core::workflow::engine::WorkflowEngine, domain: Option<String>, candidate_limit: Option<usize>) -> Result<(), anyhow::Error> {
    let relay_config = RelayConfig::from_env();
    if relay_config.webhook_secret.is_empty() {
        tracing::warn!("AGENTIC_KG_RELAY_WEBHOOK_SECRET is empty; webhook requests will never verify");
    }
    let sessions = Arc::new(SessionManager::new());
    let verifier = HmacVerifier::new(relay_config.webhook_secret.clone().into_bytes(), relay_config.signature_header.clone());
    let relay_state = Arc::new(RelayState { sessions: sessions.clone(), verifier });

    let listener = tokio::net::TcpListener::bind(relay_config.bind_addr).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(relay_state)).await {
            tracing::error!(%err, "approval relay server exited");
        }
    });
    println!("approval relay listening on {}", relay_config.bind_addr);

    let params = StartParams { domain_filter: domain, status_filter: Some(ProblemStatus::Open), candidate_limit };
    let run_id = engine.start(params).await?;
    println!("started run {run_id}");

    loop {
        let record = engine.get_state(run_id).await?;
        match record.status {
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => {
                println!("run {run_id} finished: {:?}", record.status);
                return Ok(());
            }
            RunStatus::Running => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            RunStatus::PausedAtCheckpoint => {
                let checkpoint_type = record.pending_checkpoint.expect("PausedAtCheckpoint always carries a pending checkpoint");
                let session_id = sessions.create(SessionKind::WorkflowCheckpoint { run_id, checkpoint_type });
                println!("awaiting decision for session {session_id} (checkpoint {checkpoint_type:?})");

                let decision = loop {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let Some(session) = sessions.get(session_id) else { continue };
                    if session.status == SessionStatus::Decided {
                        break session.decision.expect("Decided sessions always carry a decision").into_workflow_decision();
                    }
                };
                engine.resume(run_id, checkpoint_type, decision).await?;
            }
        }
    }
}
