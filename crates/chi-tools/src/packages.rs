//! Package Management
//!
//! Two tiers on an image-based system:
//!
//! 1. **flatpak**: GUI apps, user scope, applied immediately
//! 2. **rpm-ostree**: layered system packages, staged until the next reboot
//!
//! Anything that goes through rpm-ostree says so in its result, since the
//! change is not live until reboot.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ParameterSchema, Result as CoreResult, Tool, ToolArguments, ToolSpec};

use crate::error::{Result, ToolError};
use crate::required_str;
use crate::runner::CommandRunner;

const FLATPAK_REMOTE: &str = "flathub";
const FLATPAK_REMOTE_URL: &str = "https://dl.flathub.org/repo/flathub.flatpakrepo";
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const REMOVE_TIMEOUT: Duration = Duration::from_secs(120);
const REMOTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Known flatpak app ids for common names
const FLATPAK_IDS: &[(&str, &str)] = &[
    ("firefox", "org.mozilla.firefox"),
    ("gimp", "org.gimp.GIMP"),
    ("obs", "com.obsproject.Studio"),
    ("obs-studio", "com.obsproject.Studio"),
    ("vlc", "org.videolan.VLC"),
    ("htop", "io.github.htop-dev.htop"),
    ("discord", "com.discordapp.Discord"),
    ("slack", "com.slack.Slack"),
    ("zoom", "us.zoom.Zoom"),
    ("libreoffice", "org.libreoffice.LibreOffice"),
    ("signal", "org.signal.Signal"),
    ("telegram", "org.telegram.desktop"),
    ("spotify", "com.spotify.Client"),
    ("inkscape", "org.inkscape.Inkscape"),
    ("blender", "org.blender.Blender"),
];

/// Flatpak app id for `name`, or `name` itself if unknown
pub fn flatpak_id(name: &str) -> String {
    let lower = name.to_lowercase();
    FLATPAK_IDS
        .iter()
        .find(|(known, _)| *known == lower)
        .map_or_else(|| name.to_string(), |(_, id)| (*id).to_string())
}

/// Shared flatpak / rpm-ostree plumbing
#[derive(Clone)]
pub struct PackageManager {
    runner: Arc<dyn CommandRunner>,
}

impl PackageManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn flatpak_install(&self, name: &str) -> Result<Value> {
        if self.runner.which("flatpak").is_none() {
            return Err(ToolError::NotAvailable("flatpak not available".into()));
        }
        let app_id = flatpak_id(name);

        // Best effort: an existing remote is fine, and a failure shows up in the install
        if let Err(e) = self
            .runner
            .run(
                "flatpak",
                &["remote-add", "--if-not-exists", "--user", FLATPAK_REMOTE, FLATPAK_REMOTE_URL],
                REMOTE_TIMEOUT,
            )
            .await
        {
            tracing::warn!(error = %e, "Could not add flathub remote");
        }

        let out = self
            .runner
            .run(
                "flatpak",
                &["install", "--user", "--noninteractive", FLATPAK_REMOTE, &app_id],
                INSTALL_TIMEOUT,
            )
            .await?;
        if out.success() {
            return Ok(json!({
                "status": "installed",
                "name": name,
                "app_id": app_id,
                "method": "flatpak",
            }));
        }
        Err(ToolError::Failed(format!(
            "flatpak install failed: {}",
            out.failure_message("flatpak")
        )))
    }

    async fn rpm_ostree_install(&self, name: &str) -> Result<Value> {
        if self.runner.which("rpm-ostree").is_none() {
            return Err(ToolError::NotAvailable("rpm-ostree not available".into()));
        }
        let out = self
            .runner
            .run("rpm-ostree", &["install", "--idempotent", name], INSTALL_TIMEOUT)
            .await?;
        if out.success() {
            return Ok(json!({
                "status": "staged",
                "name": name,
                "method": "rpm-ostree",
                "note": "Reboot required to apply. Run: systemctl reboot",
            }));
        }
        Err(ToolError::Failed(format!(
            "rpm-ostree install failed: {}",
            out.failure_message("rpm-ostree")
        )))
    }

    /// flatpak first, rpm-ostree as fallback
    pub async fn install_app(&self, name: &str) -> Result<Value> {
        let flatpak_err = match self.flatpak_install(name).await {
            Ok(installed) => return Ok(installed),
            Err(e) => e,
        };
        tracing::info!(package = %name, error = %flatpak_err, "flatpak install failed, trying rpm-ostree");

        match self.rpm_ostree_install(name).await {
            Ok(mut staged) => {
                staged["flatpak_attempted"] = json!(flatpak_err.to_string());
                Ok(staged)
            }
            Err(ostree_err) => Err(ToolError::Failed(format!(
                "Could not install '{}' (flatpak: {}; rpm-ostree: {})",
                name, flatpak_err, ostree_err
            ))),
        }
    }

    pub async fn install_system(&self, name: &str) -> Result<Value> {
        self.rpm_ostree_install(name).await
    }

    /// flatpak uninstall first, then removal of a layered package
    pub async fn remove_app(&self, name: &str) -> Result<Value> {
        if self.runner.which("flatpak").is_some() {
            let app_id = flatpak_id(name);
            match self
                .runner
                .run("flatpak", &["uninstall", "--user", "--noninteractive", &app_id], REMOVE_TIMEOUT)
                .await
            {
                Ok(out) if out.success() => {
                    return Ok(json!({ "status": "removed", "name": name, "method": "flatpak" }));
                }
                Ok(out) => tracing::debug!(package = %name, error = %out.failure_message("flatpak"), "flatpak uninstall failed"),
                Err(e) => tracing::debug!(package = %name, error = %e, "flatpak uninstall failed"),
            }
        }

        if self.runner.which("rpm-ostree").is_some() {
            match self
                .runner
                .run("rpm-ostree", &["override", "remove", name], REMOVE_TIMEOUT)
                .await
            {
                Ok(out) if out.success() => {
                    return Ok(json!({
                        "status": "staged_removal",
                        "name": name,
                        "method": "rpm-ostree",
                        "note": "Reboot required to apply removal.",
                    }));
                }
                Ok(out) => tracing::debug!(package = %name, error = %out.failure_message("rpm-ostree"), "rpm-ostree removal failed"),
                Err(e) => tracing::debug!(package = %name, error = %e, "rpm-ostree removal failed"),
            }
        }

        Err(ToolError::Failed(format!(
            "Could not remove '{}'. Is it installed?",
            name
        )))
    }
}

/// Which package operation a [`PackageTool`] performs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageAction {
    InstallApp,
    InstallSystem,
    Remove,
}

/// `install_app`, `install_system` and `remove_app`
pub struct PackageTool {
    packages: PackageManager,
    action: PackageAction,
}

impl PackageTool {
    pub fn new(runner: Arc<dyn CommandRunner>, action: PackageAction) -> Self {
        Self {
            packages: PackageManager::new(runner),
            action,
        }
    }
}

#[async_trait]
impl Tool for PackageTool {
    fn spec(&self) -> ToolSpec {
        let (name, description, param) = match self.action {
            PackageAction::InstallApp => (
                "install_app",
                "Install a GUI application. Tries flatpak first (immediate), falls back to rpm-ostree (staged, requires reboot).",
                "Package or app name",
            ),
            PackageAction::InstallSystem => (
                "install_system",
                "Install a system-level package via rpm-ostree. Requires reboot to apply.",
                "RPM package name",
            ),
            PackageAction::Remove => (
                "remove_app",
                "Remove an installed application (flatpak or rpm-ostree override).",
                "App or package name",
            ),
        };
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters: vec![ParameterSchema::string("name", param)],
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let name = required_str(args, "name")?;
        let result = match self.action {
            PackageAction::InstallApp => self.packages.install_app(name).await,
            PackageAction::InstallSystem => self.packages.install_system(name).await,
            PackageAction::Remove => self.packages.remove_app(name).await,
        };
        Ok(result?)
    }
}
