//! Conversation Loop
//!
//! Drives one turn: the user's prompt goes to the model together with the
//! tool definitions, every tool call the model asks for is dispatched and its
//! result appended, and the exchange repeats until the model answers without
//! tool calls.
//!
//! A turn never fails because of the backend or a tool. An unreachable
//! backend ends the turn with an error text as the answer; tool failures are
//! fed back to the model as `{"error": ...}` payloads. Only the round ceiling
//! surfaces as an `Err`.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role, ToolInvocation};
use crate::provider::LlmProvider;
use crate::session::HistoryStore;
use crate::tool::{ToolRegistry, ToolResult};

/// Outcome of one turn
#[derive(Clone, Debug)]
pub struct TurnReply {
    /// Final answer (or backend error text)
    pub text: String,

    /// Running message list including everything added during the turn
    pub messages: Vec<Message>,

    /// Set when the turn ended because the backend call failed
    pub backend_error: Option<String>,

    /// Number of backend calls made
    pub rounds: usize,

    /// Number of tool calls dispatched
    pub tool_calls: usize,
}

impl TurnReply {
    pub fn is_backend_failure(&self) -> bool {
        self.backend_error.is_some()
    }
}

/// The conversation loop engine
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    tool_log: Option<Arc<dyn HistoryStore>>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            tool_log: None,
            config,
        }
    }

    /// Record successful tool outputs in `store`
    pub fn with_tool_log(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.tool_log = Some(store);
        self
    }

    /// Run one turn on top of `running` (the conversation so far).
    pub async fn run_turn(&self, running: &[Message], user_content: &str) -> Result<TurnReply> {
        let mut messages = running.to_vec();
        messages.push(Message::user(user_content));

        let specs = self.tools.describe();
        let mut rounds = 0;
        let mut tool_calls = 0;

        loop {
            rounds += 1;
            let reply = match self
                .provider
                .chat(&self.outbound(&messages), &specs, &self.config.generation)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(error = %e, round = rounds, "Model backend call failed");
                    return Ok(TurnReply {
                        text: format!("Error connecting to model backend: {}", e),
                        messages,
                        backend_error: Some(e.to_string()),
                        rounds,
                        tool_calls,
                    });
                }
            };

            let calls: Vec<ToolInvocation> = reply.tool_calls().to_vec();
            messages.push(reply);

            if calls.is_empty() {
                let text = messages.last().map(|m| m.content.clone()).unwrap_or_default();
                tracing::debug!(rounds, tool_calls, "Turn complete");
                return Ok(TurnReply {
                    text,
                    messages,
                    backend_error: None,
                    rounds,
                    tool_calls,
                });
            }

            if let Some(max) = self.config.max_tool_rounds {
                if rounds > max {
                    tracing::warn!(max, "Tool-call round ceiling reached");
                    return Err(AgentError::MaxIterations(max));
                }
            }

            for call in &calls {
                tool_calls += 1;
                let result = self.execute_tool(call).await;
                messages.push(Message::tool(result.to_message_content()));
            }
        }
    }

    /// Messages as the backend should see them (system prompt first)
    fn outbound(&self, messages: &[Message]) -> Vec<Message> {
        match &self.config.system_prompt {
            Some(prompt) if messages.first().map(|m| m.role) != Some(Role::System) => {
                let mut out = Vec::with_capacity(messages.len() + 1);
                out.push(Message::system(prompt.clone()));
                out.extend_from_slice(messages);
                out
            }
            _ => messages.to_vec(),
        }
    }

    async fn execute_tool(&self, call: &ToolInvocation) -> ToolResult {
        let args = call.resolve_arguments();
        tracing::info!(tool = %call.name, args = %serde_json::Value::Object(args.clone()), "Tool call");

        let result = self.tools.dispatch(&call.name, &args).await;
        tracing::info!(tool = %call.name, result = %result.to_value(), "Tool result");

        if let (ToolResult::Success(data), Some(store)) = (&result, &self.tool_log) {
            let store = Arc::clone(store);
            let (tool, data) = (call.name.clone(), data.clone());
            let recorded = tokio::task::spawn_blocking(move || store.record_tool_output(&tool, &data)).await;
            match recorded {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(tool = %call.name, error = %e, "Failed to record tool output"),
                Err(e) => tracing::warn!(tool = %call.name, error = %e, "History writer panicked"),
            }
        }

        result
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
#[derive(Default)]
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_tool_rounds(mut self, max: Option<usize>) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
