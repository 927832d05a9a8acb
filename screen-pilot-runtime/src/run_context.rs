//! Per-run configuration handed to every collaborator call.

use screen_pilot_parser::Factor;
use tokio_util::sync::CancellationToken;

/// Effective settings of one run. Each run owns its own context, so concurrent
/// sessions in one process never see each other's values.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub session_id: String,
    pub model_name: String,
    pub factor: Factor,
    pub system_prompt: String,
    /// Engine for navigate targets that are not addresses.
    pub search_engine: String,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(session_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            model_name: model_name.into(),
            factor: Factor::default(),
            system_prompt: String::new(),
            search_engine: "google".to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_factor(mut self, factor: impl Into<Factor>) -> Self {
        self.factor = factor.into();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_search_engine(mut self, search_engine: impl Into<String>) -> Self {
        self.search_engine = search_engine.into();
        self
    }

    /// Tie this run to an externally owned token (e.g. Ctrl-C).
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
