//! Relay configuration, mirroring `agentic-kg-core::config`'s
//! small `env_*`-helper aggregation idiom.

use std::net::SocketAddr;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub webhook_secret: String,
    pub signature_header: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: env_string("AGENTIC_KG_RELAY_BIND_ADDR", "127.0.0.1:8090")
                .parse()
                .unwrap_or_else(|_| "127.0.0.1:8090".parse().expect("fallback address is valid")),
            webhook_secret: env_string("AGENTIC_KG_RELAY_WEBHOOK_SECRET", ""),
            signature_header: env_string("AGENTIC_KG_RELAY_SIGNATURE_HEADER", "X-Relay-Signature"),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}
