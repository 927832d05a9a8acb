//! Abstract interfaces for runtime dependencies.

use crate::run_context::RunContext;
use crate::types::{ExecuteParams, ModelInput, ModelOutput, Screenshot};
use async_trait::async_trait;
use thiserror::Error;

/// Runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Screenshot error: {0}")]
    Screenshot(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Execute error: {0}")]
    Execute(String),

    #[error("Missing coordinates for action: {0}")]
    MissingCoordinates(String),

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled | Self::MissingCoordinates(_) | Self::Config(_)
        )
    }
}

/// A controllable screen: a desktop, a browser page, or a test double.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Capture the current frame. Fails rather than returning an empty frame
    /// when capture is impossible.
    async fn screenshot(&self, ctx: &RunContext) -> Result<Screenshot, RuntimeError>;

    /// Perform one action. Unsupported action types are logged and ignored.
    async fn execute(&self, params: &ExecuteParams, ctx: &RunContext) -> Result<(), RuntimeError>;
}

/// Vision-language model behind a uniform invoke contract.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Predict the next actions. Must return [`RuntimeError::Cancelled`]
    /// promptly once `ctx.cancel` fires.
    async fn invoke(&self, input: &ModelInput, ctx: &RunContext) -> Result<ModelOutput, RuntimeError>;
}
