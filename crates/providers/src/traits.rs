use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Request cancelled")]
    Cancelled,
}

/// One piece of message content; images are base64-encoded PNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { base64: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn image(role: impl Into<String>, base64: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![ContentPart::Image {
                base64: base64.into(),
            }],
        }
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::Image { .. }))
    }
}

/// Sampling parameters sent with each request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: Option<String>,
    pub finish_reason: String,
}

#[async_trait]
pub trait VlmProvider: Send + Sync {
    /// Run one chat completion. Implementations must return
    /// [`ProviderError::Cancelled`] promptly once `cancel` fires.
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerateResponse, ProviderError>;

    fn name(&self) -> &str;

    fn model(&self) -> &str;
}
