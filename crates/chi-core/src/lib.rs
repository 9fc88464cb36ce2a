//! # chi-core
//!
//! The part of the chiOS agent that is independent of any particular model
//! backend or operating-system tool.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       JobController                          │
//! │   ask / ask_async ── turn lock ── status cell ── events      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐   │
//! │  │ Conversation│  │    Tool     │  │    LlmProvider      │   │
//! │  │    Loop     │──│  Registry   │──│    (Strategy)       │   │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘   │
//! │          │                                                   │
//! │  ┌───────┴──────────────────────────────────────────────┐    │
//! │  │ HistoryStore: conversations + collected tool output  │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop unaware of the transport; the
//! server wires in the Ollama implementation from `chi-runtime`.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod message;
mod persistence;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

#[cfg(test)]
mod test_support;

pub use config::{AgentConfig, HistoryConfig, ServiceConfig};
pub use controller::{AgentEvent, JobController, JobId, JobStatus};
pub use error::{AgentError, Result};
pub use message::{Message, Role, ToolArguments, ToolInvocation};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, TurnReply};
pub use session::{
    CollectedDataRecord, ConversationId, ConversationSummary, HistoryStore, SessionStore,
};
pub use tool::{ParameterSchema, Tool, ToolRegistry, ToolResult, ToolSpec};
