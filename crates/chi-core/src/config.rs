//! Service configuration
//!
//! Everything is read from environment variables (after `.env` has been
//! loaded by the binary). Unparseable values fall back to the default with a
//! warning rather than refusing to start.

use chrono::TimeDelta;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::GenerationOptions;

/// Default ceiling on tool-call rounds within one turn
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 25;

/// Default gap after which a new conversation starts
pub const DEFAULT_SESSION_GAP_MINUTES: i64 = 120;

/// Default length of the conversation preview
pub const DEFAULT_PREVIEW_CHARS: usize = 120;

/// Conversation loop and controller settings
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Model and sampling options sent with every backend call
    pub generation: GenerationOptions,

    /// Prepended to the messages sent to the backend; never persisted
    pub system_prompt: Option<String>,

    /// Tool-call rounds allowed per turn; `None` loops until the model stops
    pub max_tool_rounds: Option<usize>,

    /// Upper bound on a whole turn, tool calls included
    pub turn_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            system_prompt: None,
            max_tool_rounds: Some(DEFAULT_MAX_TOOL_ROUNDS),
            turn_timeout: None,
        }
    }
}

/// History store settings
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// Idle time after which the next message opens a new conversation
    pub session_gap: TimeDelta,

    /// Characters of the first user message shown as preview
    pub preview_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            session_gap: TimeDelta::minutes(DEFAULT_SESSION_GAP_MINUTES),
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

/// Aggregate configuration for one service instance
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub agent: AgentConfig,
    pub history: HistoryConfig,
    pub history_path: PathBuf,
}

impl ServiceConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut agent = AgentConfig::default();
        if let Some(model) = lookup("CHI_MODEL").filter(|m| !m.trim().is_empty()) {
            agent.generation.model = model;
        }
        agent.system_prompt = lookup("CHI_SYSTEM_PROMPT").filter(|p| !p.trim().is_empty());
        agent.max_tool_rounds = match parse_var::<usize>(&lookup, "CHI_MAX_TOOL_ROUNDS") {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(DEFAULT_MAX_TOOL_ROUNDS),
        };
        agent.turn_timeout = parse_var::<u64>(&lookup, "CHI_TURN_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let mut history = HistoryConfig::default();
        if let Some(gap) = parse_var::<i64>(&lookup, "CHI_SESSION_GAP_MINUTES").and_then(TimeDelta::try_minutes) {
            history.session_gap = gap;
        }
        if let Some(chars) = parse_var::<usize>(&lookup, "CHI_PREVIEW_CHARS") {
            history.preview_chars = chars;
        }

        let history_path = lookup("CHI_HISTORY_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(default_history_path, PathBuf::from);

        Self {
            agent,
            history,
            history_path,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            history: HistoryConfig::default(),
            history_path: default_history_path(),
        }
    }
}

/// `~/.local/share/chiOS/history.json` on Linux
pub fn default_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chiOS")
        .join("history.json")
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
