//! Application State

use std::sync::Arc;

use chi_core::{JobController, LlmProvider};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Serializes every ask and owns the history store
    pub controller: JobController,

    /// Model backend, for health reporting
    pub provider: Arc<dyn LlmProvider>,
}

impl AppState {
    pub fn new(controller: JobController, provider: Arc<dyn LlmProvider>) -> Self {
        Self { controller, provider }
    }
}
