//! Application Launcher
//!
//! Resolution order: a binary on PATH, then Hyprland's `dispatch exec`, then
//! a matching `.desktop` entry started through `gtk-launch`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ParameterSchema, Result as CoreResult, Tool, ToolArguments, ToolSpec};

use crate::error::ToolError;
use crate::runner::CommandRunner;
use crate::required_str;

const HYPRCTL_TIMEOUT: Duration = Duration::from_secs(5);

/// Friendly names mapped to the program that provides them
const APP_ALIASES: &[(&str, &str)] = &[
    ("browser", "firefox"),
    ("web", "firefox"),
    ("terminal", "kitty"),
    ("term", "kitty"),
    ("editor", "codium"),
    ("vscode", "codium"),
    ("code", "codium"),
    ("files", "nautilus"),
    ("file manager", "nautilus"),
];

/// Resolve a friendly name to a program name
pub fn resolve_alias(app: &str) -> String {
    let lower = app.to_lowercase();
    APP_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map_or_else(|| app.to_string(), |(_, target)| (*target).to_string())
}

/// XDG application directories searched for `.desktop` entries
pub fn default_application_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/applications"),
        PathBuf::from("/usr/local/share/applications"),
    ];
    if let Some(data) = dirs::data_dir() {
        dirs.push(data.join("applications"));
    }
    dirs
}

/// Tool for launching desktop applications
pub struct LaunchAppTool {
    runner: Arc<dyn CommandRunner>,
    application_dirs: Vec<PathBuf>,
}

impl LaunchAppTool {
    pub fn new(runner: Arc<dyn CommandRunner>, application_dirs: Vec<PathBuf>) -> Self {
        Self {
            runner,
            application_dirs,
        }
    }

    /// Stem of the first `.desktop` file whose name contains `app`
    fn find_desktop_entry(&self, app: &str) -> Option<String> {
        let needle = app.to_lowercase();
        self.application_dirs
            .iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(|e| e.ok()))
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "desktop"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .find(|stem| stem.to_lowercase().contains(&needle))
    }

    async fn launch(&self, app: &str) -> Result<Value, ToolError> {
        let resolved = resolve_alias(app);

        if let Some(binary) = self.runner.which(&resolved) {
            self.runner
                .spawn_detached(&binary.to_string_lossy(), &[])
                .map_err(|e| ToolError::Failed(format!("Failed to launch {}: {}", resolved, e)))?;
            return Ok(json!({ "status": "launched", "app": resolved, "method": "binary" }));
        }

        if self.runner.which("hyprctl").is_some() {
            match self
                .runner
                .run("hyprctl", &["dispatch", "exec", &resolved], HYPRCTL_TIMEOUT)
                .await
            {
                Ok(out) if out.success() => {
                    return Ok(json!({ "status": "launched", "app": resolved, "method": "hyprctl" }));
                }
                Ok(out) => tracing::debug!(app = %resolved, error = %out.failure_message("hyprctl"), "hyprctl exec failed"),
                Err(e) => tracing::debug!(app = %resolved, error = %e, "hyprctl exec failed"),
            }
        }

        if let Some(entry) = self.find_desktop_entry(&resolved) {
            if self.runner.which("gtk-launch").is_some() {
                self.runner
                    .spawn_detached("gtk-launch", &[&entry])
                    .map_err(|e| ToolError::Failed(format!("gtk-launch failed: {}", e)))?;
                return Ok(json!({ "status": "launched", "app": entry, "method": "gtk-launch" }));
            }
        }

        Err(ToolError::NotAvailable(format!(
            "Could not find or launch '{}'. Is it installed?",
            app
        )))
    }
}

#[async_trait]
impl Tool for LaunchAppTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "launch_app".into(),
            description: "Launch a desktop application by name or .desktop entry.".into(),
            parameters: vec![ParameterSchema::string(
                "app",
                "App name, e.g. 'firefox', 'kitty', 'codium'",
            )],
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let app = required_str(args, "app")?;
        Ok(self.launch(app).await?)
    }
}
