//! Signed webhook surface: external decision callers post a signed
//! JSON body to resolve a pending session. HMAC verification is
//! grounded directly on the teacher's
//! `http_input::webhook_verify::HmacVerifier` (hex-encoded
//! `HMAC-SHA256(secret, body)`, constant-time comparison), trimmed to
//! the single custom-header shape this relay needs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::RelayError;
use crate::session::{ApprovalSession, RelayDecision, SessionManager};

type HmacSha256 = Hmac<Sha256>;

/// Verifies `HMAC-SHA256(secret, body)`, hex-encoded in the configured
/// header, against a freshly computed digest in constant time.
pub struct HmacVerifier {
    secret: Vec<u8>,
    header_name: String,
}

impl HmacVerifier {
    pub fn new(secret: Vec<u8>, header_name: String) -> Self {
        Self { secret, header_name }
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), RelayError> {
        let header_value = headers
            .get(&self.header_name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RelayError::MissingHeader(self.header_name.clone()))?;

        let provided = hex::decode(header_value).map_err(|e| RelayError::InvalidSignature(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| RelayError::InvalidSignature(e.to_string()))?;
        mac.update(body);
        let computed = mac.finalize().into_bytes();

        if computed.as_slice().ct_eq(&provided).unwrap_u8() != 1 {
            return Err(RelayError::VerificationFailed);
        }
        Ok(())
    }
}

pub struct RelayState {
    pub sessions: Arc<SessionManager>,
    pub verifier: HmacVerifier,
}

#[derive(Debug, Deserialize)]
pub struct DecisionPayload {
    pub decision: RelayDecision,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/sessions/:id/decision", post(submit_decision))
        .route("/sessions", axum::routing::get(list_pending))
        .with_state(state)
}

async fn list_pending(State(state): State<Arc<RelayState>>) -> Json<Vec<ApprovalSession>> {
    Json(state.sessions.list_pending())
}

async fn submit_decision(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    if let Err(e) = state.verifier.verify(&headers, &body) {
        return (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: e.to_string() })).into_response();
    }

    let payload: DecisionPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response(),
    };

    match state.sessions.decide(id, payload.decision) {
        Ok(session) => Json(session).into_response(),
        Err(e @ RelayError::SessionNotFound(_)) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: e.to_string() })).into_response(),
        Err(e @ RelayError::AlreadyDecided(_)) => (StatusCode::CONFLICT, Json(ErrorBody { error: e.to_string() })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: e.to_string() })).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let secret = b"relay-secret";
        let body = b"{\"decision\":\"approve\"}";
        let sig = sign(secret, body);
        let mut headers = HeaderMap::new();
        headers.insert("X-Relay-Signature", sig.parse().unwrap());

        let verifier = HmacVerifier::new(secret.to_vec(), "X-Relay-Signature".to_string());
        assert!(verifier.verify(&headers, body).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let secret = b"relay-secret";
        let sig = sign(secret, b"{\"decision\":\"approve\"}");
        let mut headers = HeaderMap::new();
        headers.insert("X-Relay-Signature", sig.parse().unwrap());

        let verifier = HmacVerifier::new(secret.to_vec(), "X-Relay-Signature".to_string());
        assert!(matches!(verifier.verify(&headers, b"{\"decision\":\"reject\"}"), Err(RelayError::VerificationFailed)));
    }

    #[test]
    fn verify_fails_on_missing_header() {
        let verifier = HmacVerifier::new(b"s".to_vec(), "X-Relay-Signature".to_string());
        assert!(matches!(verifier.verify(&HeaderMap::new(), b"body"), Err(RelayError::MissingHeader(_))));
    }
}
