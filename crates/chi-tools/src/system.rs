//! Network and Service Management
//!
//! NetworkManager is driven through `nmcli` in terse mode, systemd through
//! `systemctl` (user units first, then system units).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use chi_core::{ParameterSchema, Result as CoreResult, Tool, ToolArguments, ToolSpec};

use crate::error::{Result, ToolError};
use crate::required_str;
use crate::runner::CommandRunner;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const CHANGE_TIMEOUT: Duration = Duration::from_secs(30);

pub const SERVICE_ACTIONS: &[&str] = &["start", "stop", "restart", "status"];

/// One active NetworkManager connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveConnection {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub device: String,
}

/// Split one line of `nmcli -t` output. Fields are separated by `:`, with
/// literal colons and backslashes escaped by a backslash.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if let Some(field) = fields.last_mut() {
                        field.push(escaped);
                    }
                }
            }
            ':' => fields.push(String::new()),
            _ => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}

/// Map `nmcli general` STATE text to NetworkManager's state names
pub fn network_state(nmcli_state: &str) -> String {
    match nmcli_state.trim() {
        "connected" => "connected_global".into(),
        "connected (site only)" => "connected_site".into(),
        "connected (local only)" => "connected_local".into(),
        "connecting" => "connecting".into(),
        "disconnected" | "asleep" | "disconnecting" => "disconnected".into(),
        other => format!("unknown({})", other),
    }
}

/// `get_network_status`
pub struct NetworkStatusTool {
    runner: Arc<dyn CommandRunner>,
}

impl NetworkStatusTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn status(&self) -> Result<Value> {
        if self.runner.which("nmcli").is_none() {
            return Err(ToolError::NotAvailable("NetworkManager not available".into()));
        }

        let general = self
            .runner
            .run("nmcli", &["-t", "-f", "STATE", "general"], STATUS_TIMEOUT)
            .await?;
        let active = self
            .runner
            .run(
                "nmcli",
                &["-t", "-f", "NAME,TYPE,DEVICE", "connection", "show", "--active"],
                STATUS_TIMEOUT,
            )
            .await?;
        if !active.success() {
            return Err(ToolError::Failed(active.failure_message("nmcli")));
        }

        let connections: Vec<ActiveConnection> = active
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(split_terse)
            .filter(|fields| fields.len() >= 2)
            .map(|fields| ActiveConnection {
                id: fields[0].clone(),
                kind: fields[1].clone(),
                device: fields.get(2).cloned().unwrap_or_default(),
            })
            .collect();

        let mut status = json!({ "active_connections": connections });
        if general.success() {
            status["state"] = json!(network_state(&general.stdout));
        }
        Ok(status)
    }
}

#[async_trait]
impl Tool for NetworkStatusTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_network_status".into(),
            description: "Get current network connection status.".into(),
            parameters: vec![],
        }
    }

    async fn invoke(&self, _args: &ToolArguments) -> CoreResult<Value> {
        Ok(self.status().await?)
    }
}

/// `set_network`
pub struct SetNetworkTool {
    runner: Arc<dyn CommandRunner>,
}

impl SetNetworkTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn set(&self, connection: &str, enable: bool) -> Result<Value> {
        if self.runner.which("nmcli").is_none() {
            return Err(ToolError::NotAvailable("nmcli not available".into()));
        }
        let action = if enable { "up" } else { "down" };
        let out = self
            .runner
            .run("nmcli", &["connection", action, connection], CHANGE_TIMEOUT)
            .await?;
        if out.success() {
            return Ok(json!({ "status": "success", "connection": connection, "enabled": enable }));
        }
        Err(ToolError::Failed(out.failure_message("nmcli")))
    }
}

#[async_trait]
impl Tool for SetNetworkTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_network".into(),
            description: "Enable or disable a network connection.".into(),
            parameters: vec![
                ParameterSchema::string("connection", "Connection name"),
                ParameterSchema::boolean("enable", "true to bring the connection up, false to take it down"),
            ],
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let connection = required_str(args, "connection")?;
        let enable = args
            .get("enable")
            .and_then(Value::as_bool)
            .ok_or_else(|| ToolError::InvalidArgument("enable must be a boolean".into()))?;
        Ok(self.set(connection, enable).await?)
    }
}

/// `manage_service`
pub struct ManageServiceTool {
    runner: Arc<dyn CommandRunner>,
}

impl ManageServiceTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn manage(&self, service: &str, action: &str) -> Result<Value> {
        if !SERVICE_ACTIONS.contains(&action) {
            return Err(ToolError::InvalidArgument(format!("Invalid action: {}", action)));
        }
        let unit = if service.ends_with(".service") {
            service.to_string()
        } else {
            format!("{}.service", service)
        };

        for scope in ["--user", "--system"] {
            match self
                .runner
                .run("systemctl", &[scope, action, &unit], CHANGE_TIMEOUT)
                .await
            {
                Ok(out) if out.success() => {
                    if action == "status" {
                        return Ok(json!({ "service": unit, "status": out.stdout, "scope": scope }));
                    }
                    return Ok(json!({
                        "status": "success",
                        "service": unit,
                        "action": action,
                        "scope": scope,
                    }));
                }
                Ok(out) => tracing::debug!(unit = %unit, scope, error = %out.failure_message("systemctl"), "systemctl failed"),
                Err(e) => tracing::debug!(unit = %unit, scope, error = %e, "systemctl failed"),
            }
        }

        Err(ToolError::Failed(format!(
            "Could not {} {}. Check if the service exists: systemctl list-units --all",
            action, unit
        )))
    }
}

#[async_trait]
impl Tool for ManageServiceTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "manage_service".into(),
            description: "Start, stop, restart, or get status of a systemd service.".into(),
            parameters: vec![
                ParameterSchema::string("service", "systemd service name"),
                ParameterSchema::string("action", "What to do with the service").one_of(SERVICE_ACTIONS),
            ],
        }
    }

    async fn invoke(&self, args: &ToolArguments) -> CoreResult<Value> {
        let service = required_str(args, "service")?;
        let action = required_str(args, "action")?;
        Ok(self.manage(service, action).await?)
    }
}
