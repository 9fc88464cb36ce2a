//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model backend returned something unusable
    #[error("Provider error: {0}")]
    Provider(String),

    /// Model backend unreachable or timed out
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool arguments did not match the declared parameters
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool-call round ceiling reached within one turn
    #[error("Maximum tool-call rounds ({0}) reached")]
    MaxIterations(usize),

    /// Turn exceeded its time budget
    #[error("Turn timed out after {0}s")]
    TurnTimeout(u64),

    /// History persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Message placed in a tool error payload.
    ///
    /// Tool failures carry their bare message; the model sees `{"error": msg}`.
    pub fn tool_message(&self) -> String {
        match self {
            AgentError::ToolExecution(msg) | AgentError::ToolValidation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
