//! Command Execution
//!
//! Every tool reaches the operating system through [`CommandRunner`], so the
//! tools can be exercised against [`MockRunner`] without touching the host.

mod mock;

pub use mock::MockRunner;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{Result, ToolError};

/// Captured result of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Best description of a failure: stderr, else stdout, else the exit code
    pub fn failure_message(&self, program: &str) -> String {
        if !self.stderr.is_empty() {
            self.stderr.clone()
        } else if !self.stdout.is_empty() {
            self.stdout.clone()
        } else {
            format!("{} exited {}", program, self.status)
        }
    }
}

/// Runs external programs on behalf of tools (Strategy pattern)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Locate `program` on PATH
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run `program args..` to completion, capturing trimmed output
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput>;

    /// Run a command line through `sh -c`
    async fn run_shell(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Start `program` in its own process group without waiting for it
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()>;
}

/// Runs commands on the host with `tokio::process`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    async fn output(mut cmd: Command, command_line: String, timeout: Duration) -> Result<CommandOutput> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        let child = cmd.output();
        let output = match tokio::time::timeout(timeout, child).await {
            Ok(result) => result.map_err(|source| ToolError::Spawn { program, source })?,
            Err(_) => {
                tracing::warn!(command = %command_line, secs = timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    command: command_line,
                    secs: timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    fn which(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(program))
            .find(|p| is_executable(p))
    }

    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let command_line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %command_line, "Running command");

        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::output(cmd, command_line, timeout).await
    }

    async fn run_shell(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        tracing::debug!(command = %command, "Running shell command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        Self::output(cmd, command.to_string(), timeout).await
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;
        tracing::info!(program = %program, pid = ?child.id(), "Spawned detached process");
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
