//! Single seam for running external tools (git, ssh, uv)
//!
//! Every subprocess in RepoDock goes through [`run_command`]: output is always
//! captured (no inherited terminal, no interactive prompts from the child),
//! and a hard timeout bounds operations that could otherwise hang on a dead
//! network.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

/// Default upper bound for git network operations (clone, pull, fetch).
pub const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound for local git queries (status, log, stash list).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code, if the process exited normally.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Run `program` with `args`, capturing output, bounded by `limit`.
///
/// Returns `Err` only for process-level failures: the binary is missing, the
/// process could not be spawned, or the timeout elapsed. A non-zero exit code
/// is a normal `Ok` result; callers inspect [`CommandOutput::success`].
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<CommandOutput> {
    let mut command = AsyncCommand::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!("Running: {} {}", program, args.join(" "));

    let output = timeout(limit, command.output())
        .await
        .with_context(|| format!("{} timed out after {}s", program, limit.as_secs()))?
        .with_context(|| format!("Failed to execute {}", program))?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Check whether a command is available in PATH.
pub async fn is_command_available(program: &str) -> bool {
    run_command("which", &[program], None, QUERY_TIMEOUT)
        .await
        .map(|output| output.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let output = run_command("echo", &["hello"], None, QUERY_TIMEOUT)
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_ok_not_err() {
        let output = run_command("false", &[], None, QUERY_TIMEOUT).await.unwrap();

        assert!(!output.success());
        assert_eq!(output.code, Some(1));
    }

    #[tokio::test]
    async fn test_missing_binary_is_err() {
        let result = run_command(
            "repodock-no-such-binary",
            &[],
            None,
            QUERY_TIMEOUT,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_err() {
        let result = run_command("sleep", &["5"], None, Duration::from_millis(100)).await;

        assert!(result.is_err());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        let output = run_command("pwd", &[], Some(temp.path()), QUERY_TIMEOUT)
            .await
            .unwrap();

        // Compare canonicalized paths: the temp dir may sit behind a symlink.
        let reported = std::path::PathBuf::from(output.stdout_trimmed());
        assert_eq!(
            reported.canonicalize().unwrap(),
            temp.path().canonicalize().unwrap()
        );
    }
}
