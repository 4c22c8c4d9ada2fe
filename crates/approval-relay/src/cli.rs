//! Local decision surface: the same `SessionManager` operations the
//! webhook exposes, callable directly by an embedding process (e.g. the
//! root CLI's `workflow` command driving checkpoints without standing
//! up the HTTP relay).

use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RelayError;
use crate::session::{ApprovalSession, RelayDecision, SessionManager};

#[derive(Debug, Parser)]
#[command(name = "agentic-kg-approval-relay", about = "Human approval relay for workflow checkpoints")]
pub struct RelayCli {
    #[command(subcommand)]
    pub command: RelayCommand,
}

#[derive(Debug, Subcommand)]
pub enum RelayCommand {
    /// List pending approval sessions.
    List,
    /// Approve a pending session unchanged.
    Approve { session_id: Uuid },
    /// Reject a pending session, short-circuiting its run to END.
    Reject {
        session_id: Uuid,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Approve with an edited JSON patch applied before proceeding.
    Edit {
        session_id: Uuid,
        /// JSON-merge-patch document, e.g. '{"title": "revised"}'
        #[arg(long)]
        data: String,
    },
    /// Start the signed webhook server.
    Serve,
}

pub fn format_sessions(sessions: &[ApprovalSession]) -> String {
    if sessions.is_empty() {
        return "no pending sessions".to_string();
    }
    sessions
        .iter()
        .map(|s| format!("{}  {:?}  created {}", s.id, s.kind, s.created_at.to_rfc3339()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute a non-`Serve` subcommand against a `SessionManager`, returning
/// a human-readable line for the CLI to print. `Serve` is handled by the
/// binary entry point since it owns the axum listener.
pub fn run(manager: &SessionManager, command: RelayCommand) -> Result<String, RelayError> {
    match command {
        RelayCommand::List => Ok(format_sessions(&manager.list_pending())),
        RelayCommand::Approve { session_id } => {
            manager.decide(session_id, RelayDecision::Approve)?;
            Ok(format!("{session_id} approved"))
        }
        RelayCommand::Reject { session_id, feedback } => {
            manager.decide(session_id, RelayDecision::Reject { feedback })?;
            Ok(format!("{session_id} rejected"))
        }
        RelayCommand::Edit { session_id, data } => {
            let parsed: Value = serde_json::from_str(&data).map_err(|e| RelayError::Serialization(e.to_string()))?;
            manager.decide(session_id, RelayDecision::Edit { data: parsed })?;
            Ok(format!("{session_id} edited"))
        }
        RelayCommand::Serve => Ok("serve is handled by the binary entry point".to_string()),
    }
}
