//! Shell Command Tool
//!
//! Runs a command line as the current user through `sh -c`, bounded by a
//! timeout. A pattern denylist rejects obviously destructive commands and
//! package operations that have dedicated tools. The denylist is a speed
//! bump, not a sandbox.

use async_trait::async_trait;
use regex::RegexSet;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ParameterSchema, Result as CoreResult, Tool, ToolArguments, ToolSpec};

use crate::error::{Result, ToolError};
use crate::required_str;
use crate::runner::CommandRunner;

pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Patterns that are never run
pub const DENY_PATTERNS: &[&str] = &[
    r"rm\s+-rf?\s+/",
    r">\s*/dev/(s?d[a-z])",
    r"dd\s+.*of=/dev/",
    r"mkfs",
    r":\(\)\s*\{\s*:\|:&\s*\};:",
    r"sudo\s+su\b",
    r"passwd\s+root",
    r"rpm-ostree\s+",
    r"flatpak\s+",
];

/// Tool for running shell commands
pub struct RunShellTool {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    denylist: RegexSet,
}

impl RunShellTool {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Result<Self> {
        let denylist = RegexSet::new(DENY_PATTERNS)
            .map_err(|e| ToolError::Config(format!("Invalid shell denylist: {}", e)))?;
        Ok(Self {
            runner,
            timeout,
            denylist,
        })
    }

    /// The first denied pattern `command` matches, if any
    pub fn denied_pattern(&self, command: &str) -> Option<&'static str> {
        self.denylist
            .matches(command)
            .iter()
            .next()
            .map(|idx| DENY_PATTERNS[idx])
    }

    async fn run(&self, command: &str) -> Result<Value> {
        if let Some(pattern) = self.denied_pattern(command) {
            tracing::warn!(command = %command, pattern, "Blocked shell command");
            return Err(ToolError::Blocked(format!(
                "Command matches denied pattern: {}",
                pattern
            )));
        }

        let out = self.runner.run_shell(command, self.timeout).await?;
        Ok(json!({
            "returncode": out.status,
            "stdout": out.stdout,
            "stderr": out.stderr,
            "success": out.success(),
        }))
    }
}

#[async_trait]
impl Tool for RunShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_shell".into(),
            description: format!(
                "Run a shell command as the current user. {}s timeout. Not for destructive operations.",
                self.timeout.as_secs()
            ),
            parameters: vec![ParameterSchema::string("command", "Shell command to run")],
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let command = required_str(args, "command")?;
        Ok(self.run(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, MockRunner};

    fn tool(runner: Arc<MockRunner>) -> RunShellTool {
        RunShellTool::new(runner, DEFAULT_SHELL_TIMEOUT).unwrap()
    }

    #[test]
    fn test_denylist() {
        let shell = tool(Arc::new(MockRunner::new()));
        for command in [
            "rm -rf /",
            "rm -r /home",
            "cat image > /dev/sda",
            "dd if=/dev/zero of=/dev/nvme0n1",
            "mkfs.ext4 /dev/sdb1",
            ":(){ :|:& };:",
            "sudo su",
            "passwd root",
            "rpm-ostree reset",
            "flatpak uninstall --all",
        ] {
            assert!(shell.denied_pattern(command).is_some(), "{command} should be blocked");
        }
        for command in ["ls -la", "uptime", "rm -rf ./build", "echo sudo summary", "df -h"] {
            assert!(shell.denied_pattern(command).is_none(), "{command} should be allowed");
        }
    }

    #[tokio::test]
    async fn test_blocked_command_never_runs() {
        let runner = Arc::new(MockRunner::new());
        let shell = tool(runner.clone());
        let args = serde_json::json!({"command": "mkfs /dev/sda"}).as_object().cloned().unwrap();

        let err = shell.invoke(&args).await.unwrap_err();
        assert_eq!(err.tool_message(), "Command blocked: Command matches denied pattern: mkfs");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_output_shape() {
        let runner = Arc::new(MockRunner::new().respond(
            "uptime",
            CommandOutput::ok("10:00 up 3 days"),
        ));
        let shell = tool(runner);
        let args = serde_json::json!({"command": "uptime"}).as_object().cloned().unwrap();

        let result = shell.invoke(&args).await.unwrap();
        assert_eq!(
            result,
            json!({"returncode": 0, "stdout": "10:00 up 3 days", "stderr": "", "success": true})
        );
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let shell = tool(Arc::new(MockRunner::new().time_out("sleep")));
        let args = serde_json::json!({"command": "sleep 60"}).as_object().cloned().unwrap();
        let err = shell.invoke(&args).await.unwrap_err();
        assert_eq!(err.tool_message(), "Command timed out after 30s: sleep 60");
    }
}
