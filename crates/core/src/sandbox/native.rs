//! Native process sandbox.
//!
//! **WARNING**: this enforces resource limits via `rlimit` and kills the
//! whole process group on timeout, but it does not provide container- or
//! VM-grade isolation. It is the minimal tier satisfying `SandboxRunner`;
//! additional tiers (container/jail-backed) are expected to implement the
//! same trait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::{ExecutionResult, SandboxError, SandboxRunner};

#[derive(Debug, Clone)]
pub struct NativeConfig {
    pub executable: String,
    pub working_directory: PathBuf,
    pub memory_mb: u64,
    pub cpu_cores: u32,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub network_disabled: bool,
    pub read_only_root: bool,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            executable: "python3".to_string(),
            working_directory: PathBuf::from("/tmp/agentic-kg-sandbox"),
            memory_mb: 2048,
            cpu_cores: 1,
            timeout: Duration::from_secs(300),
            max_output_bytes: 50 * 1024,
            network_disabled: true,
            read_only_root: true,
        }
    }
}

pub struct NativeSandboxRunner {
    config: NativeConfig,
}

impl NativeSandboxRunner {
    pub fn new(config: NativeConfig) -> Result<Self, SandboxError> {
        tracing::warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::warn!("Native Sandbox: rlimit isolation only, no container/VM boundary");
        tracing::warn!("Executable: {}", config.executable);
        tracing::warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !config.working_directory.exists() {
            std::fs::create_dir_all(&config.working_directory)
                .map_err(|e| SandboxError::Spawn(e.to_string()))?;
        }

        Ok(Self { config })
    }

    pub fn with_defaults() -> Result<Self, SandboxError> {
        Self::new(NativeConfig::default())
    }

    #[cfg(unix)]
    fn apply_limits(&self, command: &mut Command) {
        let memory_bytes = self.config.memory_mb * 1024 * 1024;
        let cpu_seconds = (self.config.cpu_cores.max(1) as u64) * self.config.timeout.as_secs().max(1);

        // SAFETY: pre_exec runs between fork() and exec() in the child; only
        // async-signal-safe calls (setrlimit, setpgid) are made here.
        unsafe {
            command.pre_exec(move || {
                rlimit::setrlimit(rlimit::Resource::AS, memory_bytes, memory_bytes)
                    .map_err(|e| std::io::Error::other(format!("setrlimit(AS) failed: {e}")))?;
                rlimit::setrlimit(rlimit::Resource::CPU, cpu_seconds, cpu_seconds)
                    .map_err(|e| std::io::Error::other(format!("setrlimit(CPU) failed: {e}")))?;
                // Own process group so a timeout can kill the whole tree.
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(not(unix))]
    fn apply_limits(&self, _command: &mut Command) {
        tracing::warn!("resource limits are not enforced on this platform");
    }

    async fn read_limited<R: AsyncReadExt + Unpin>(reader: &mut R, max_bytes: usize) -> (String, bool) {
        let mut buf = vec![0u8; max_bytes + 1];
        let mut total = 0usize;
        loop {
            match reader.read(&mut buf[total..]).await {
                Ok(0) => break,
                Ok(n) => {
                    total += n;
                    if total > max_bytes {
                        total = max_bytes;
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let truncated = total == max_bytes;
        let text = String::from_utf8_lossy(&buf[..total]).to_string();
        if truncated {
            (format!("{text}\n... [output truncated at {max_bytes} bytes]"), true)
        } else {
            (text, false)
        }
    }

    #[cfg(unix)]
    fn kill_process_group(pid: i32) {
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    fn kill_process_group(_pid: i32) {}
}

#[async_trait]
impl SandboxRunner for NativeSandboxRunner {
    async fn execute(&self, code: &str, env: HashMap<String, String>) -> Result<ExecutionResult, SandboxError> {
        tracing::debug!(executable = %self.config.executable, "running generated script in native sandbox");

        let mut command = Command::new(&self.config.executable);
        command.arg("-c").arg(code);
        command.current_dir(&self.config.working_directory);
        command.envs(env);
        if self.config.network_disabled {
            command.env("NO_PROXY", "*").env_remove("HTTP_PROXY").env_remove("HTTPS_PROXY");
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        self.apply_limits(&mut command);

        let start = std::time::Instant::now();
        let max_output = self.config.max_output_bytes;

        let mut child = command.spawn().map_err(|e| SandboxError::Spawn(e.to_string()))?;
        let pid = child.id().map(|p| p as i32);
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let run = timeout(self.config.timeout, async {
            let stdout_fut = async {
                match stdout.as_mut() {
                    Some(s) => Self::read_limited(s, max_output).await,
                    None => (String::new(), false),
                }
            };
            let stderr_fut = async {
                match stderr.as_mut() {
                    Some(s) => Self::read_limited(s, max_output).await,
                    None => (String::new(), false),
                }
            };
            let ((out, out_trunc), (err, err_trunc)) = tokio::join!(stdout_fut, stderr_fut);
            let status = child.wait().await;
            (out, out_trunc, err, err_trunc, status)
        })
        .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match run {
            Ok((stdout, stdout_truncated, stderr, stderr_truncated, Ok(status))) => Ok(ExecutionResult {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
                stdout_truncated,
                stderr_truncated,
                execution_time_ms: elapsed_ms,
                timed_out: false,
            }),
            Ok((_, _, _, _, Err(e))) => Err(SandboxError::Execution(e.to_string())),
            Err(_) => {
                if let Some(pid) = pid {
                    Self::kill_process_group(pid);
                }
                Ok(ExecutionResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    stdout_truncated: false,
                    stderr_truncated: false,
                    execution_time_ms: elapsed_ms,
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_python_and_captures_stdout() {
        let config = NativeConfig { executable: "python3".to_string(), ..Default::default() };
        let runner = match NativeSandboxRunner::new(config) {
            Ok(r) => r,
            Err(_) => return,
        };
        let result = runner.execute("print('hello from sandbox')", HashMap::new()).await.unwrap();
        if !result.timed_out {
            assert!(result.stdout.contains("hello from sandbox"));
        }
    }

    #[tokio::test]
    async fn times_out_long_running_script() {
        let config = NativeConfig {
            executable: "python3".to_string(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let runner = match NativeSandboxRunner::new(config) {
            Ok(r) => r,
            Err(_) => return,
        };
        let result = runner.execute("import time; time.sleep(5)", HashMap::new()).await.unwrap();
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn truncates_oversized_output() {
        let config = NativeConfig { executable: "python3".to_string(), max_output_bytes: 20, ..Default::default() };
        let runner = match NativeSandboxRunner::new(config) {
            Ok(r) => r,
            Err(_) => return,
        };
        let result = runner.execute("print('x' * 1000)", HashMap::new()).await.unwrap();
        if !result.timed_out {
            assert!(result.stdout_truncated);
            assert!(result.stdout.contains("truncated"));
        }
    }
}
