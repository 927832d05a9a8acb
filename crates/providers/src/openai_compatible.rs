use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Chat-completions client for OpenAI-compatible VLM endpoints (vLLM, TGI, hosted APIs).
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn request_body(&self, messages: &[Message], params: &GenerationParams) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_openai_messages(messages),
            "stream": false,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = params.top_p {
            body["top_p"] = json!(top_p);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{}: {}", status, text)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_completion(&json)
    }
}

/// Convert messages into the OpenAI wire shape. Text-only messages keep a plain
/// string `content`; messages with images use the content-part array.
pub fn to_openai_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            if let [ContentPart::Text { text }] = message.parts.as_slice() {
                return json!({ "role": message.role, "content": text });
            }
            let parts: Vec<Value> = message
                .parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::Image { base64 } => json!({
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", base64) }
                    }),
                })
                .collect();
            json!({ "role": message.role, "content": parts })
        })
        .collect()
}

/// Pull the first choice out of a chat-completions response body.
pub fn parse_completion(json: &Value) -> Result<GenerateResponse, ProviderError> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    let content = choice["message"]["content"].as_str().map(|s| s.to_string());
    let finish_reason = choice["finish_reason"]
        .as_str()
        .unwrap_or("stop")
        .to_string();

    Ok(GenerateResponse {
        content,
        finish_reason,
    })
}

#[async_trait]
impl VlmProvider for OpenAICompatibleProvider {
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerateResponse, ProviderError> {
        let body = self.request_body(messages, params);
        debug!(
            "Sending {} messages ({} with images) to {}",
            messages.len(),
            messages.iter().filter(|m| m.has_image()).count(),
            self.model
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = self.send(&body) => result,
        }
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
