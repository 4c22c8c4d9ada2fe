//! Human-checkpoint side channel: a small dual-surface (CLI + signed
//! webhook) relay that the Workflow Engine's interrupt-before
//! checkpoints and the Review Queue use to notify and collect human
//! decisions out-of-process.

pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod webhook;

pub use config::RelayConfig;
pub use error::RelayError;
pub use session::{ApprovalSession, RelayDecision, SessionKind, SessionManager, SessionStatus};
pub use webhook::{HmacVerifier, RelayState};
