//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` over Ollama's `/api/chat` endpoint.
//! Requests are sent with `stream: false`, so each call yields exactly one
//! assistant message, possibly carrying tool calls.

use std::time::Duration;

use async_trait::async_trait;
use chi_core::{
    error::{AgentError, Result},
    message::{Message, Role, ToolInvocation},
    provider::{GenerationOptions, LlmProvider},
    tool::ToolSpec,
};
use serde::{Deserialize, Serialize};

/// Model pulled when neither the configured model nor a qwen3 variant exists
pub const FALLBACK_MODEL: &str = "qwen3:8b";

const FALLBACK_FAMILY: &str = "qwen3";
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `OLLAMA_HOST`, `OLLAMA_PORT` and `OLLAMA_TIMEOUT_SECS` through
    /// `lookup`. Unset, blank or unparsable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let host = lookup("OLLAMA_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(defaults.host);
        let port = lookup("OLLAMA_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(defaults.port);
        let timeout_secs = lookup("OLLAMA_TIMEOUT_SECS")
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            host,
            port,
            timeout_secs,
        }
    }

    /// `host:port` without a trailing slash
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

// --- Wire format -----------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Make sure a usable model is installed, pulling the fallback if not.
    ///
    /// Returns `true` if a pull was issued.
    pub async fn ensure_model(&self, preferred: &str) -> Result<bool> {
        let installed = self.installed_models().await?;
        if installed
            .iter()
            .any(|name| name.starts_with(preferred) || name.starts_with(FALLBACK_FAMILY))
        {
            tracing::debug!(model = %preferred, "Model present");
            return Ok(false);
        }

        tracing::info!(model = %FALLBACK_MODEL, "Model not found locally, pulling");
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&serde_json::json!({ "name": FALLBACK_MODEL, "stream": false }))
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(true)
    }

    async fn installed_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let tags: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Invalid /api/tags response: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls()
                    .iter()
                    .map(|call| WireToolCall {
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect(),
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<WireTool<'_>> {
        tools
            .iter()
            .map(|spec| WireTool {
                kind: "function",
                function: WireFunction {
                    name: &spec.name,
                    description: &spec.description,
                    parameters: spec.json_schema(),
                },
            })
            .collect()
    }

    /// Convert the reply to an assistant message, arguments left undecoded
    fn convert_reply(message: Option<WireMessage>) -> Message {
        let Some(message) = message else {
            return Message::assistant("");
        };

        let reply = Message::new(Role::Assistant, message.content);
        if message.tool_calls.is_empty() {
            return reply;
        }
        reply.with_tool_calls(
            message
                .tool_calls
                .into_iter()
                .map(|call| ToolInvocation::new(call.function.name, call.function.arguments))
                .collect(),
        )
    }
}

fn transport_error(e: reqwest::Error) -> AgentError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Provider(format!("HTTP {}: {}", status, body.trim())))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn health_check(&self) -> Result<bool> {
        match self.installed_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &GenerationOptions,
    ) -> Result<Message> {
        let request = ChatRequest {
            model: &options.model,
            messages: Self::convert_messages(messages),
            tools: Self::convert_tools(tools),
            stream: false,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let reply: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Invalid /api/chat response: {}", e)))?;

        let message = Self::convert_reply(reply.message);
        tracing::debug!(
            model = %options.model,
            tool_calls = message.tool_calls().len(),
            "Model replied"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
    use chi_core::tool::ParameterSchema;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        chat: Arc<Mutex<Option<Value>>>,
        pulls: Arc<Mutex<Vec<Value>>>,
    }

    /// Serve a fake Ollama on a free local port
    async fn stub(chat_reply: Value, tags: Value) -> (OllamaProvider, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/api/chat",
                post(move |State(rec): State<Recorded>, Json(body): Json<Value>| {
                    let reply = chat_reply.clone();
                    async move {
                        *rec.chat.lock().unwrap() = Some(body);
                        Json(reply)
                    }
                }),
            )
            .route(
                "/api/tags",
                get(move || {
                    let tags = tags.clone();
                    async move { Json(tags) }
                }),
            )
            .route(
                "/api/pull",
                post(|State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                    rec.pulls.lock().unwrap().push(body);
                    Json(json!({"status": "success"}))
                }),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();
        (provider, recorded)
    }

    fn launch_spec() -> ToolSpec {
        ToolSpec {
            name: "launch_app".into(),
            description: "Launch a desktop application".into(),
            parameters: vec![ParameterSchema::string("app", "App name")],
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "http://gpu-box/"),
            ("OLLAMA_PORT", " 8080 "),
            ("OLLAMA_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();
        let config = OllamaConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.base_url(), "http://gpu-box:8080");
    }

    #[test]
    fn test_config_bad_env_keeps_defaults() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "   "),
            ("OLLAMA_PORT", "not-a-port"),
            ("OLLAMA_TIMEOUT_SECS", "-5"),
        ]
        .into_iter()
        .collect();
        let config = OllamaConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            Message::system("You are chi."),
            Message::user("Open firefox"),
            Message::assistant("").with_tool_calls(vec![ToolInvocation::new(
                "launch_app",
                json!({"app": "firefox"}),
            )]),
            Message::tool(r#"{"status":"launched"}"#),
        ];

        let converted = serde_json::to_value(OllamaProvider::convert_messages(&messages)).unwrap();
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[2]["tool_calls"][0]["function"]["name"], "launch_app");
        assert_eq!(converted[3], json!({"role": "tool", "content": r#"{"status":"launched"}"#}));
    }

    #[tokio::test]
    async fn test_chat_request_and_tool_calls() {
        let (provider, recorded) = stub(
            json!({
                "model": "chi",
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [
                        {"function": {"name": "launch_app", "arguments": {"app": "kitty"}}},
                        {"function": {"name": "run_shell", "arguments": "{\"command\": \"uptime\"}"}}
                    ]
                },
                "done": true
            }),
            json!({"models": []}),
        )
        .await;

        let reply = provider
            .chat(&[Message::user("hi")], &[launch_spec()], &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.tool_calls().len(), 2);
        assert_eq!(reply.tool_calls()[0].arguments, json!({"app": "kitty"}));
        assert_eq!(reply.tool_calls()[1].arguments, json!("{\"command\": \"uptime\"}"));
        assert_eq!(reply.tool_calls()[1].resolve_arguments()["command"], "uptime");

        let sent = recorded.chat.lock().unwrap().clone().unwrap();
        assert_eq!(sent["model"], "chi");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["tools"][0]["type"], "function");
        assert_eq!(sent["tools"][0]["function"]["parameters"]["required"], json!(["app"]));
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let (provider, _) = stub(
            json!({"message": {"role": "assistant", "content": "Hello!"}, "done": true}),
            json!({"models": []}),
        )
        .await;
        let reply = provider
            .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.content, "Hello!");
        assert!(!reply.has_tool_calls());
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();
        let err = provider
            .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert!(!provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::NOT_FOUND, "model 'chi' not found") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();
        let err = provider
            .chat(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            AgentError::Provider(msg) => assert!(msg.contains("model 'chi' not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_model_present() {
        let (provider, recorded) = stub(json!({}), json!({"models": [{"name": "chi:latest"}]})).await;
        assert!(!provider.ensure_model("chi").await.unwrap());
        assert!(recorded.pulls.lock().unwrap().is_empty());

        let models = provider.installed_models().await.unwrap();
        assert_eq!(models, vec!["chi:latest".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_model_pulls_fallback() {
        let (provider, recorded) = stub(json!({}), json!({"models": [{"name": "llama3.2:3b"}]})).await;
        assert!(provider.ensure_model("chi").await.unwrap());
        let pulls = recorded.pulls.lock().unwrap().clone();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0]["name"], FALLBACK_MODEL);
    }
}
