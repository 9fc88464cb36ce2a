//! Dev Environments
//!
//! Thin wrappers over the `envclone` CLI, which manages containerized
//! development environments on nerdctl/containerd.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ParameterSchema, Result as CoreResult, Tool, ToolArguments, ToolSpec};

use crate::error::{Result, ToolError};
use crate::required_str;
use crate::runner::CommandRunner;

const ENVCLONE: &str = "envclone";

/// envclone subcommands exposed as tools
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvcloneCommand {
    Init,
    Up,
    Down,
    Code,
}

impl EnvcloneCommand {
    pub const ALL: [EnvcloneCommand; 4] = [Self::Init, Self::Up, Self::Down, Self::Code];

    fn subcommand(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Up => "up",
            Self::Down => "down",
            Self::Code => "code",
        }
    }

    fn timeout(self) -> Duration {
        match self {
            Self::Init => Duration::from_secs(120),
            Self::Up => Duration::from_secs(60),
            Self::Down | Self::Code => Duration::from_secs(30),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Init => "Initialize a new dev environment using envclone.",
            Self::Up => "Start an envclone dev environment.",
            Self::Down => "Stop an envclone dev environment.",
            Self::Code => "Open VSCodium in an envclone dev environment.",
        }
    }
}

/// `envclone_init`, `envclone_up`, `envclone_down`, `envclone_code`
pub struct EnvcloneTool {
    runner: Arc<dyn CommandRunner>,
    command: EnvcloneCommand,
}

impl EnvcloneTool {
    pub fn new(runner: Arc<dyn CommandRunner>, command: EnvcloneCommand) -> Self {
        Self { runner, command }
    }

    async fn envclone(&self, args: &[&str]) -> Result<Value> {
        if self.runner.which(ENVCLONE).is_none() {
            return Err(ToolError::NotAvailable(
                "envclone not installed. Expected at /usr/local/bin/envclone".into(),
            ));
        }

        let mut full = vec![self.command.subcommand()];
        full.extend_from_slice(args);
        let out = self.runner.run(ENVCLONE, &full, self.command.timeout()).await?;
        if out.success() {
            return Ok(json!({ "status": "success", "output": out.stdout }));
        }
        Err(ToolError::Failed(out.failure_message(ENVCLONE)))
    }
}

#[async_trait]
impl Tool for EnvcloneTool {
    fn spec(&self) -> ToolSpec {
        let mut parameters = Vec::new();
        if self.command == EnvcloneCommand::Init {
            parameters.push(ParameterSchema::string(
                "env_type",
                "Environment type, e.g. 'python', 'node', 'rust'",
            ));
            parameters.push(ParameterSchema::string("name", "Project name"));
        } else {
            parameters.push(ParameterSchema::string("name", "Environment name"));
        }

        ToolSpec {
            name: format!("envclone_{}", self.command.subcommand()),
            description: self.command.description().into(),
            parameters,
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let name = required_str(args, "name")?;
        let result = if self.command == EnvcloneCommand::Init {
            let env_type = required_str(args, "env_type")?;
            self.envclone(&[env_type, name]).await
        } else {
            self.envclone(&[name]).await
        };
        Ok(result?)
    }
}
