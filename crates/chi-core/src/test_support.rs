//! Stub tools, a scripted backend and a manual clock shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role, ToolArguments, ToolInvocation};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::{CollectedDataRecord, ConversationId, ConversationSummary, HistoryStore};
use crate::tool::{ParameterSchema, Tool, ToolSpec};

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

fn spec(name: &str, parameters: Vec<ParameterSchema>) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: format!("Test tool {}", name),
        parameters,
    }
}

/// Returns `{"echo": text}`
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        spec(
            "echo",
            vec![
                ParameterSchema::string("text", "Text to echo back"),
                ParameterSchema::string("mode", "Echo style")
                    .one_of(&["plain", "upper"])
                    .optional(),
            ],
        )
    }

    async fn invoke(&self, args: &ToolArguments) -> Result<Value> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        let text = match args.get("mode").and_then(Value::as_str) {
            Some("upper") => text.to_uppercase(),
            _ => text.to_string(),
        };
        Ok(json!({ "echo": text }))
    }
}

/// Always fails with "boom"
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn spec(&self) -> ToolSpec {
        spec("fail", vec![])
    }

    async fn invoke(&self, _args: &ToolArguments) -> Result<Value> {
        Err(AgentError::ToolExecution("boom".into()))
    }
}

/// Panics when invoked
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn spec(&self) -> ToolSpec {
        spec("panic", vec![])
    }

    async fn invoke(&self, _args: &ToolArguments) -> Result<Value> {
        panic!("tool exploded")
    }
}

/// Sleeps, tracking how many invocations overlap
#[derive(Default)]
pub struct SlowTool {
    pub delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn max_overlap(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for Arc<SlowTool> {
    fn spec(&self) -> ToolSpec {
        spec("slow", vec![])
    }

    async fn invoke(&self, _args: &ToolArguments) -> Result<Value> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "slept_ms": self.delay.as_millis() as u64 }))
    }
}

/// Blocks until released, signalling when it has been entered
#[derive(Default)]
pub struct GatedTool {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl Tool for Arc<GatedTool> {
    fn spec(&self) -> ToolSpec {
        spec("gate", vec![])
    }

    async fn invoke(&self, _args: &ToolArguments) -> Result<Value> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!({ "gate": "opened" }))
    }
}

/// Assistant message requesting the given tool calls
pub fn tool_call_reply(calls: &[(&str, Value)]) -> Message {
    Message::assistant("").with_tool_calls(
        calls
            .iter()
            .map(|(name, args)| ToolInvocation::new(*name, args.clone()))
            .collect(),
    )
}

/// Backend that answers from a queue and records what it was sent
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Message>>>,
    fallback: Option<Message>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Message>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answers `reply` forever
    pub fn repeating(reply: Message) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Message lists received, one per call
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    /// Last user message of each call
    pub fn prompts(&self) -> Vec<String> {
        self.seen()
            .iter()
            .filter_map(|sent| {
                sent.iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
        _options: &GenerationOptions,
    ) -> Result<Message> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(AgentError::Provider("script exhausted".into())),
        }
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

impl HistoryStore for BrokenStore {
    fn append_message(&self, _role: Role, _content: &str) -> Result<ConversationId> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn record_tool_output(&self, _tool: &str, _data: &Value) -> Result<()> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn list_conversations(&self, _limit: usize) -> Result<Vec<ConversationSummary>> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn list_tool_outputs(&self, _limit: usize) -> Result<Vec<CollectedDataRecord>> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn delete_conversation(&self, _id: ConversationId) -> Result<bool> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn clear_all(&self) -> Result<()> {
        Err(AgentError::Storage("disk full".into()))
    }

    fn clear_tool_outputs(&self) -> Result<()> {
        Err(AgentError::Storage("disk full".into()))
    }
}
