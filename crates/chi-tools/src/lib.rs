//! # chi-tools
//!
//! The desktop capabilities the chi agent can call:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  apps        launch_app                                      │
//! │  packages    install_app, install_system, remove_app         │
//! │  shell       run_shell (denylist + timeout)                  │
//! │  system      get_network_status, set_network, manage_service │
//! │  envclone    envclone_init, envclone_up, envclone_down,      │
//! │              envclone_code                                   │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                        CommandRunner
//!                 (SystemRunner | MockRunner)
//! ```
//!
//! Failures are returned as errors and reach the model as
//! `{"error": "..."}` payloads; nothing here aborts a turn.

pub mod apps;
pub mod envclone;
pub mod error;
pub mod packages;
pub mod runner;
pub mod shell;
pub mod system;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ToolArguments, ToolRegistry};

pub use error::{Result, ToolError};
pub use runner::{CommandOutput, CommandRunner, MockRunner, SystemRunner};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::apps::LaunchAppTool;
    pub use crate::envclone::{EnvcloneCommand, EnvcloneTool};
    pub use crate::packages::{PackageAction, PackageTool};
    pub use crate::shell::RunShellTool;
    pub use crate::system::{ManageServiceTool, NetworkStatusTool, SetNetworkTool};
}

/// Tool settings
#[derive(Clone, Debug)]
pub struct ToolsConfig {
    /// Upper bound for `run_shell`
    pub shell_timeout: Duration,

    /// Where `launch_app` looks for `.desktop` entries
    pub application_dirs: Vec<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout: shell::DEFAULT_SHELL_TIMEOUT,
            application_dirs: apps::default_application_dirs(),
        }
    }
}

impl ToolsConfig {
    /// Defaults, with `CHI_SHELL_TIMEOUT_SECS` applied if set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = lookup("CHI_SHELL_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            config.shell_timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Register every desktop tool, in the order the model sees them
pub fn register_all(
    registry: &mut ToolRegistry,
    runner: Arc<dyn CommandRunner>,
    config: &ToolsConfig,
) -> Result<()> {
    use tools::*;

    registry.register(LaunchAppTool::new(runner.clone(), config.application_dirs.clone()));
    registry.register(PackageTool::new(runner.clone(), PackageAction::InstallApp));
    registry.register(PackageTool::new(runner.clone(), PackageAction::InstallSystem));
    registry.register(PackageTool::new(runner.clone(), PackageAction::Remove));
    registry.register(RunShellTool::new(runner.clone(), config.shell_timeout)?);
    registry.register(NetworkStatusTool::new(runner.clone()));
    registry.register(SetNetworkTool::new(runner.clone()));
    registry.register(ManageServiceTool::new(runner.clone()));
    for command in EnvcloneCommand::ALL {
        registry.register(EnvcloneTool::new(runner.clone(), command));
    }

    tracing::debug!(tools = registry.len(), "Registered desktop tools");
    Ok(())
}

/// Registry of all desktop tools running real commands
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_all(&mut registry, Arc::new(SystemRunner), config)?;
    Ok(registry)
}

/// String argument `name`, which the registry has already checked for
/// presence and type
pub(crate) fn required_str<'a>(args: &'a ToolArguments, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument(format!("Missing required parameter: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shell_timeout_from_env() {
        let config = ToolsConfig::from_lookup(|key| (key == "CHI_SHELL_TIMEOUT_SECS").then(|| "45".to_string()));
        assert_eq!(config.shell_timeout, Duration::from_secs(45));

        let config = ToolsConfig::from_lookup(|_| Some("0".to_string()));
        assert_eq!(config.shell_timeout, shell::DEFAULT_SHELL_TIMEOUT);
    }

    #[test]
    fn test_registry_order() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, Arc::new(MockRunner::new()), &ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "launch_app",
                "install_app",
                "install_system",
                "remove_app",
                "run_shell",
                "get_network_status",
                "set_network",
                "manage_service",
                "envclone_init",
                "envclone_up",
                "envclone_down",
                "envclone_code",
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_through_registry() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, Arc::new(MockRunner::new()), &ToolsConfig::default()).unwrap();

        let args = json!({"service": "sshd", "action": "explode"}).as_object().cloned().unwrap();
        let rejected = registry.dispatch("manage_service", &args).await;
        assert!(!rejected.is_success());

        let args = json!({"connection": "Home", "enable": "yes"}).as_object().cloned().unwrap();
        let rejected = registry.dispatch("set_network", &args).await;
        assert_eq!(
            rejected.to_value(),
            json!({"error": "Parameter 'enable' must be of type boolean"})
        );

        let blocked = registry
            .dispatch("run_shell", &json!({"command": "rm -rf /"}).as_object().cloned().unwrap())
            .await;
        assert_eq!(
            blocked.to_value()["error"],
            format!("Command blocked: Command matches denied pattern: {}", shell::DENY_PATTERNS[0])
        );
    }
}
