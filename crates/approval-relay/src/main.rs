//! Webhook-surface entry point for the approval relay. The CLI surface
//! (`cli::run`) is a library function meant to be embedded by a process
//! that already holds the `SessionManager` driving a `WorkflowEngine` in
//! the same address space (e.g. the root binary's `workflow` command);
//! this binary only stands up the out-of-process signed-webhook side.

use std::sync::Arc;

use agentic_kg_approval_relay::config::RelayConfig;
use agentic_kg_approval_relay::session::SessionManager;
use agentic_kg_approval_relay::webhook::{router, HmacVerifier, RelayState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = RelayConfig::from_env();
    if config.webhook_secret.is_empty() {
        tracing::warn!("AGENTIC_KG_RELAY_WEBHOOK_SECRET is empty; webhook requests will never verify");
    }

    let state = Arc::new(RelayState {
        sessions: Arc::new(SessionManager::new()),
        verifier: HmacVerifier::new(config.webhook_secret.clone().into_bytes(), config.signature_header.clone()),
    });

    tracing::info!(addr = %config.bind_addr, "approval relay listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
