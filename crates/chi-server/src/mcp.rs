//! MCP Mode
//!
//! Serves the tool registry to an external MCP client over stdio: one
//! JSON-RPC message per line in, one per line out. Tools are listed under a
//! `chi_` prefix and calls go straight to the registry, without the model.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use chi_core::{ToolArguments, ToolRegistry, ToolResult};

const SERVER_NAME: &str = "chi-agent";
const TOOL_PREFIX: &str = "chi_";
const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

// JSON-RPC error codes
const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;

/// Answer requests until the client closes `input`
pub async fn serve<R, W>(registry: &ToolRegistry, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tracing::info!(tools = registry.len(), "MCP server listening on stdio");

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Ok(request) => handle(registry, &request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable MCP message");
                Some(error_response(Value::Null, PARSE_ERROR, &format!("parse error: {}", e)))
            }
        };

        if let Some(response) = response {
            output.write_all(response.to_string().as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
    }

    tracing::info!("MCP client disconnected");
    Ok(())
}

/// Response to one message; `None` for notifications
async fn handle(registry: &ToolRegistry, request: &Value) -> Option<Value> {
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let Some(id) = request.get("id").filter(|id| !id.is_null()).cloned() else {
        tracing::debug!(method, "MCP notification");
        return None;
    };
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    let result = match method {
        "initialize" => {
            let protocol = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            json!({
                "protocolVersion": protocol,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })
        }
        "ping" => json!({}),
        "tools/list" => json!({ "tools": list_tools(registry) }),
        "tools/call" => call_tool(registry, &params).await,
        other => {
            tracing::debug!(method = other, "Unknown MCP method");
            return Some(error_response(id, METHOD_NOT_FOUND, "method not found"));
        }
    };

    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn list_tools(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .describe()
        .into_iter()
        .map(|spec| {
            let schema = spec.json_schema();
            json!({
                "name": format!("{}{}", TOOL_PREFIX, spec.name),
                "description": spec.description,
                "inputSchema": schema,
            })
        })
        .collect()
}

async fn call_tool(registry: &ToolRegistry, params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let args = match params.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        _ => ToolArguments::new(),
    };

    let tool = name
        .strip_prefix(TOOL_PREFIX)
        .filter(|tool| registry.get(tool).is_some());
    let result = match tool {
        Some(tool) => {
            tracing::info!(tool, "MCP tool call");
            registry.dispatch(tool, &args).await
        }
        None => {
            tracing::warn!(tool = name, "MCP call for unknown tool");
            ToolResult::error(format!("Unknown tool: {}", name))
        }
    };

    json!({
        "content": [{ "type": "text", "text": result.to_message_content() }],
        "isError": !result.is_success(),
    })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
