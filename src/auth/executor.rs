//! Subprocess execution for command-backed authorizers.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{Error, Result};

/// Captured result of one command run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout with surrounding whitespace and one layer of quotes removed.
    pub fn token_text(&self) -> String {
        unquote(&self.stdout_lossy()).to_string()
    }

    /// Turn a failed run into [`Error::Command`].
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(Error::Command {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr_lossy().trim().to_string(),
        })
    }
}

/// Strip whitespace and one pair of wrapping quotes.
pub fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim()
}

/// Runs an argv and captures its output.
///
/// Spawn failures are errors; a non-zero exit is reported through
/// [`CommandOutput::success`] so callers can attach stderr.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// [`Executor`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::config("empty command line"))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::CommandSpawn {
                program: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(|source| Error::CommandSpawn {
                program: program.clone(),
                source,
            })?;

        tracing::debug!(
            program = %program,
            status = ?output.status.code(),
            "Command finished"
        );

        Ok(CommandOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("  \"eyJ0\"\n"), "eyJ0");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("plain\n"), "plain");
        assert_eq!(unquote("\""), "\"");
    }

    #[tokio::test]
    async fn test_process_executor_echo() {
        let output = ProcessExecutor::default()
            .run(&argv(&["echo", "\"test-token\""]))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.token_text(), "test-token");
    }

    #[tokio::test]
    async fn test_process_executor_failure_keeps_stderr() {
        let output = ProcessExecutor::default()
            .run(&argv(&["sh", "-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.status, Some(3));

        let err = output.check("sh").unwrap_err();
        assert_eq!(err.to_string(), "sh failed with exit code 3: boom");
    }

    #[tokio::test]
    async fn test_process_executor_spawn_failure() {
        let err = ProcessExecutor::default()
            .run(&argv(&["/nonexistent/graph-auth-helper"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandSpawn { .. }));
    }

    #[tokio::test]
    async fn test_process_executor_timeout() {
        let err = ProcessExecutor::new(Duration::from_millis(50))
            .run(&argv(&["sleep", "5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
