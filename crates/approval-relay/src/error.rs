//! Error taxonomy for the approval relay.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("session {0} was already decided")]
    AlreadyDecided(Uuid),
    #[error("missing header: {0}")]
    MissingHeader(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
