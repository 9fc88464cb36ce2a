//! Error Types for desktop tools

use chi_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ToolError {
    /// Required program is not on PATH
    #[error("{0}")]
    NotAvailable(String),

    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command blocked: {0}")]
    Blocked(String),

    /// The command ran but reported failure
    #[error("{0}")]
    Failed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidArgument(msg) => AgentError::ToolValidation(msg),
            ToolError::Config(msg) => AgentError::Config(msg),
            other => AgentError::ToolExecution(other.to_string()),
        }
    }
}
