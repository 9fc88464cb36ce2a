//! Conversation Messages
//!
//! Standard message format used across the agent system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named tool arguments after resolution
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Configured system prompt (never persisted)
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result fed back to the model
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call requested by the model.
///
/// `arguments` is kept exactly as the backend sent it: some backends emit a
/// JSON object, others a string containing JSON. Use
/// [`ToolInvocation::resolve_arguments`] to get the named-argument map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool identifier, must match a registry entry
    pub name: String,

    /// Raw arguments as produced by the backend
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Decode the raw arguments into a named-argument map.
    ///
    /// A string is parsed as JSON. Anything that does not end up as a JSON
    /// object (bad JSON, arrays, scalars, null) resolves to an empty map.
    pub fn resolve_arguments(&self) -> ToolArguments {
        match &self.arguments {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::String(raw) => {
                match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(serde_json::Value::Object(map)) => map,
                    _ => {
                        tracing::debug!(tool = %self.name, "Undecodable tool arguments, using empty map");
                        ToolArguments::new()
                    }
                }
            }
            _ => ToolArguments::new(),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (may be empty when the turn only carries tool calls)
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the model, in the order returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Attach tool calls to an assistant message
    pub fn with_tool_calls(mut self, calls: Vec<ToolInvocation>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    /// Tool calls carried by this message (empty if none)
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Whether the model asked for at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_empty_tool_call_list_counts_as_none() {
        let msg = Message::assistant("done").with_tool_calls(Vec::new());
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_resolve_object_arguments() {
        let call = ToolInvocation::new("launch_app", json!({"app": "firefox"}));
        let args = call.resolve_arguments();
        assert_eq!(args.get("app"), Some(&json!("firefox")));
    }

    #[test]
    fn test_resolve_string_arguments() {
        let call = ToolInvocation::new("set_network", json!(r#"{"connection": "home", "enable": true}"#));
        let args = call.resolve_arguments();
        assert_eq!(args.get("connection"), Some(&json!("home")));
        assert_eq!(args.get("enable"), Some(&json!(true)));
    }

    #[test]
    fn test_undecodable_arguments_resolve_empty() {
        assert!(ToolInvocation::new("x", json!("{not json")).resolve_arguments().is_empty());
        assert!(ToolInvocation::new("x", json!("[1, 2]")).resolve_arguments().is_empty());
        assert!(ToolInvocation::new("x", serde_json::Value::Null).resolve_arguments().is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let value = serde_json::to_value(Message::tool("{}")).unwrap();
        assert_eq!(value["role"], "tool");
        assert!(value.get("tool_calls").is_none());
    }
}
