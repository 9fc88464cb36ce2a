//! LLM Provider Strategy Pattern
//!
//! Defines the model-backend interface the conversation loop talks to.
//! A backend receives the whole running message list plus the tool
//! definitions and answers with exactly one message, which may carry tool
//! calls. There is no streaming: turns are exchanged as whole messages.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chi_core::provider::{GenerationOptions, LlmProvider};
//!
//! let provider = OllamaProvider::from_env();
//! let reply = provider.chat(&messages, &registry.describe(), &options).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::ToolSpec;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "chi", "qwen3:8b")
    pub model: String,
}

pub const DEFAULT_MODEL: &str = "chi";

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
        }
    }
}

/// Strategy trait for model backends
///
/// Implementations must map network failures and timeouts to
/// [`AgentError::ProviderUnavailable`](crate::AgentError::ProviderUnavailable)
/// and malformed responses to [`AgentError::Provider`](crate::AgentError::Provider).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Send the running message list and tool definitions, get one reply
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &GenerationOptions,
    ) -> Result<Message>;
}
