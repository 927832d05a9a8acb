//! Model adapter: provider transport plus the reply parser.

use crate::interfaces::{ModelClient, RuntimeError};
use crate::metrics::{MetricTimer, MODEL_INVOKE_LATENCY};
use crate::run_context::RunContext;
use crate::types::{ModelInput, ModelOutput, Role};
use async_trait::async_trait;
use screen_pilot_parser::{parse_prediction, ParseOptions};
use screen_pilot_providers::{ContentPart, GenerationParams, Message, ProviderError, VlmProvider};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) fn provider_error(err: ProviderError) -> RuntimeError {
    match err {
        ProviderError::Cancelled => RuntimeError::Cancelled,
        other => RuntimeError::Model(other.to_string()),
    }
}

/// Convert a model request into provider messages, resolving image indices.
pub fn to_provider_messages(input: &ModelInput) -> Vec<Message> {
    input
        .conversations
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            match turn.image.and_then(|index| input.images.get(index)) {
                Some(base64) => Message {
                    role: role.to_string(),
                    parts: vec![ContentPart::Image {
                        base64: base64.clone(),
                    }],
                },
                None => Message::text(role, turn.content.clone()),
            }
        })
        .collect()
}

/// [`ModelClient`] backed by a vision-language chat provider.
pub struct VlmModel {
    provider: Arc<dyn VlmProvider>,
    params: GenerationParams,
}

impl VlmModel {
    pub fn new(provider: Arc<dyn VlmProvider>, params: GenerationParams) -> Self {
        Self { provider, params }
    }
}

#[async_trait]
impl ModelClient for VlmModel {
    async fn invoke(&self, input: &ModelInput, ctx: &RunContext) -> Result<ModelOutput, RuntimeError> {
        if ctx.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let messages = to_provider_messages(input);
        debug!(
            "Invoking {} with {} messages and {} images",
            self.provider.model(),
            messages.len(),
            input.images.len()
        );

        let response = {
            let _timer = MetricTimer::new(MODEL_INVOKE_LATENCY);
            self.provider
                .generate(&messages, &self.params, &ctx.cancel)
                .await
                .map_err(provider_error)?
        };

        let prediction = response.content.unwrap_or_default();
        let parsed_predictions =
            parse_prediction(&ParseOptions::new(&prediction, ctx.factor)).parsed;
        info!(
            "Model replied ({}), {} action(s) parsed",
            response.finish_reason,
            parsed_predictions.len()
        );

        Ok(ModelOutput {
            prediction,
            parsed_predictions,
        })
    }
}
