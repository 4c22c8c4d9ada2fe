//! Isolated execution of generated evaluation scripts (§4.19).

#[cfg(feature = "native-sandbox")]
pub mod native;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[cfg(feature = "native-sandbox")]
pub use native::{NativeConfig, NativeSandboxRunner};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn sandboxed process: {0}")]
    Spawn(String),
    #[error("sandbox execution failed: {0}")]
    Execution(String),
    #[error("executable '{0}' is not in the allowed list")]
    ExecutableNotAllowed(String),
}

/// Result of a single sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub execution_time_ms: u64,
    /// Set when the wall-clock timeout killed the process group rather
    /// than the process exiting on its own.
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Scan stdout for a trailing JSON object and parse it; absent or
    /// unparseable → an empty map rather than an error, since a script
    /// that prints no metrics is not itself a sandbox failure.
    pub fn parse_metrics(&self) -> HashMap<String, Value> {
        let trimmed = self.stdout.trim_end();
        let Some(brace_start) = trimmed.rfind('{') else {
            return HashMap::new();
        };
        let candidate = &trimmed[brace_start..];
        match serde_json::from_str::<HashMap<String, Value>>(candidate) {
            Ok(map) => map,
            Err(_) => HashMap::new(),
        }
    }
}

/// Isolation contract a generated script is executed under. A fresh
/// runner invocation corresponds to a fresh process; nothing persists
/// between calls.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn execute(&self, code: &str, env: HashMap<String, String>) -> Result<ExecutionResult, SandboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_metrics_extracts_trailing_json_object() {
        let result = ExecutionResult {
            exit_code: 0,
            stdout: "some log line\n{\"accuracy\": 0.9, \"loss\": 0.1}".to_string(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            execution_time_ms: 10,
            timed_out: false,
        };
        let metrics = result.parse_metrics();
        assert_eq!(metrics.get("accuracy").unwrap(), &serde_json::json!(0.9));
    }

    #[test]
    fn parse_metrics_returns_empty_map_when_absent() {
        let result = ExecutionResult {
            exit_code: 0,
            stdout: "no metrics here".to_string(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            execution_time_ms: 10,
            timed_out: false,
        };
        assert!(result.parse_metrics().is_empty());
    }
}
