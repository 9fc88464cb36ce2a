//! Tool System
//!
//! Tools are registered once at startup and dispatched by the conversation
//! loop. Dispatch never fails: every problem (unknown name, bad arguments,
//! failing or panicking implementation) comes back as an error payload the
//! model can read on its next round.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::ToolArguments;

/// Error payload returned to the model: `{"error": "..."}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolFailure {
    pub error: String,
}

/// Result of a tool dispatch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    /// `{"error": msg}`; listed first so it wins during deserialization
    Error(ToolFailure),
    /// Whatever the tool returned
    Success(serde_json::Value),
}

impl ToolResult {
    pub fn success(data: serde_json::Value) -> Self {
        ToolResult::Success(data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error(ToolFailure {
            error: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    /// The payload as a JSON value
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ToolResult::Success(data) => data.clone(),
            ToolResult::Error(failure) => serde_json::json!({ "error": failure.error }),
        }
    }

    /// Content of the `tool` message fed back to the model.
    ///
    /// String payloads go through verbatim, everything else as compact JSON.
    pub fn to_message_content(&self) -> String {
        match self {
            ToolResult::Success(serde_json::Value::String(text)) => text.clone(),
            other => other.to_value().to_string(),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    /// A required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }

    /// A required boolean parameter
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: "boolean".into(),
            ..Self::string(name, description)
        }
    }

    /// Restrict to a fixed set of string values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| serde_json::json!(v)).collect());
        self
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

/// Tool definition (name, description, parameters) as offered to the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSpec {
    /// JSON Schema object describing the parameters
    pub fn json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = serde_json::json!({ "type": param.param_type });
            if !param.description.is_empty() {
                prop["description"] = serde_json::json!(param.description);
            }
            if let Some(values) = &param.enum_values {
                prop["enum"] = serde_json::json!(values);
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(param.name.clone());
            }
        }

        let mut schema = serde_json::json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = serde_json::json!(required);
        }
        schema
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's definition for LLM function calling
    fn spec(&self) -> ToolSpec;

    /// Run the tool. An `Err` becomes an error payload, never a panic or abort.
    async fn invoke(&self, args: &ToolArguments) -> Result<serde_json::Value>;

    /// Check argument shapes against the declared parameters
    fn validate(&self, args: &ToolArguments) -> Result<()> {
        for param in &self.spec().parameters {
            match args.get(&param.name) {
                None | Some(serde_json::Value::Null) if param.required => {
                    return Err(AgentError::ToolValidation(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                None | Some(serde_json::Value::Null) => {}
                Some(value) => {
                    if !param.accepts(value) {
                        return Err(AgentError::ToolValidation(format!(
                            "Parameter '{}' must be of type {}",
                            param.name, param.param_type
                        )));
                    }
                    if let Some(allowed) = &param.enum_values {
                        if !allowed.contains(value) {
                            return Err(AgentError::ToolValidation(format!(
                                "Parameter '{}' must be one of {}",
                                param.name,
                                serde_json::Value::Array(allowed.clone())
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Registry for available tools, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(String, Arc<dyn Tool>)>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    /// Register a shared tool. A second tool with the same name replaces the first.
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        if let Some(&pos) = self.index.get(&name) {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
            self.tools[pos].1 = tool;
        } else {
            self.index.insert(name.clone(), self.tools.len());
            self.tools.push((name, tool));
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&pos| Arc::clone(&self.tools[pos].1))
    }

    /// Tool definitions in registration order
    pub fn describe(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|(_, t)| t.spec()).collect()
    }

    /// Resolve a call by name, validate it and run it
    pub async fn dispatch(&self, name: &str, args: &ToolArguments) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        if let Err(e) = tool.validate(args) {
            return ToolResult::error(e.tool_message());
        }

        match AssertUnwindSafe(tool.invoke(args)).catch_unwind().await {
            Ok(Ok(data)) => ToolResult::success(data),
            Ok(Err(e)) => ToolResult::error(e.tool_message()),
            Err(_) => {
                tracing::error!(tool = %name, "Tool panicked");
                ToolResult::error(format!("Tool '{}' crashed", name))
            }
        }
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EchoTool, FailingTool, PanickingTool};
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool);
        registry.register(PanickingTool);
        registry
    }

    #[test]
    fn test_describe_keeps_registration_order() {
        let names: Vec<String> = registry().describe().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "fail", "panic"]);
        assert_eq!(registry().names(), vec!["echo", "fail", "panic"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_payload() {
        let result = registry().dispatch("format_disk", &ToolArguments::new()).await;
        assert_eq!(result, ToolResult::error("Unknown tool: format_disk"));
        assert_eq!(result.to_value(), json!({"error": "Unknown tool: format_disk"}));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let result = registry().dispatch("echo", &args(json!({"text": "hi"}))).await;
        assert_eq!(result, ToolResult::success(json!({"echo": "hi"})));
    }

    #[tokio::test]
    async fn test_missing_and_mistyped_arguments() {
        let reg = registry();
        let missing = reg.dispatch("echo", &ToolArguments::new()).await;
        assert_eq!(missing, ToolResult::error("Missing required parameter: text"));

        let mistyped = reg.dispatch("echo", &args(json!({"text": 5}))).await;
        assert_eq!(mistyped, ToolResult::error("Parameter 'text' must be of type string"));
    }

    #[tokio::test]
    async fn test_enum_is_enforced() {
        let reg = registry();
        let result = reg
            .dispatch("echo", &args(json!({"text": "x", "mode": "shout"})))
            .await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_contained() {
        let reg = registry();
        let failed = reg.dispatch("fail", &ToolArguments::new()).await;
        assert_eq!(failed, ToolResult::error("boom"));

        let crashed = reg.dispatch("panic", &ToolArguments::new()).await;
        assert_eq!(crashed, ToolResult::error("Tool 'panic' crashed"));
    }

    #[test]
    fn test_message_content() {
        assert_eq!(ToolResult::success(json!("plain")).to_message_content(), "plain");
        assert_eq!(
            ToolResult::success(json!({"a": [1, 2]})).to_message_content(),
            r#"{"a":[1,2]}"#
        );
        assert_eq!(ToolResult::error("nope").to_message_content(), r#"{"error":"nope"}"#);
    }

    #[test]
    fn test_json_schema() {
        let schema = EchoTool.spec().json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["text"]));
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["plain", "upper"]));
    }

    #[test]
    fn test_error_payload_round_trips_as_error() {
        let parsed: ToolResult = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert_eq!(parsed, ToolResult::error("x"));
        let parsed: ToolResult = serde_json::from_str(r#"{"error":"x","hint":"y"}"#).unwrap();
        assert!(parsed.is_success());
    }
}
