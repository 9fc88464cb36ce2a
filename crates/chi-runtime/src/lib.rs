//! # chi-runtime
//!
//! Model backend providers for the chi agent.
//!
//! ## Providers
//!
//! - **Ollama**: local inference through the `/api/chat` endpoint, with
//!   native tool calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chi_runtime::OllamaProvider;
//!
//! let provider = OllamaProvider::from_env()?;
//! provider.ensure_model("chi").await?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

pub mod ollama;

pub use ollama::{FALLBACK_MODEL, OllamaConfig, OllamaProvider};
