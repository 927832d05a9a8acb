//! Deferred screenshot extraction and step summaries.
//!
//! [`StepRecorder`] records one [`OperationStep`] per screenshot and starts its
//! extraction in the background, bounded by a semaphore. The loop never waits
//! on an extraction; [`StepRecorder::finish`] joins them once the run is over.

use crate::interfaces::RuntimeError;
use crate::model::provider_error;
use crate::plugins::Plugin;
use crate::prompts::{summary_prompt, EXTRACTION_PROMPT};
use crate::types::{ExecuteParams, Screenshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use screen_pilot_providers::{ContentPart, GenerationParams, Message, VlmProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of extractions allowed to run at once.
pub const DEFAULT_EXTRACTION_CONCURRENCY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub content: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, screenshot_base64: &str) -> Result<ExtractionResult, RuntimeError>;
}

/// A recorded step with its extraction resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationStep {
    pub screenshot: String,
    pub thought: Option<String>,
    pub extraction: Option<ExtractionResult>,
}

struct PendingStep {
    screenshot: String,
    thought: Option<String>,
    extraction: Option<JoinHandle<Option<ExtractionResult>>>,
}

/// Plugin that turns the run into a list of operation steps.
pub struct StepRecorder {
    extractor: Option<Arc<dyn Extractor>>,
    limiter: Arc<Semaphore>,
    steps: Mutex<Vec<PendingStep>>,
}

impl StepRecorder {
    pub fn new(extractor: Option<Arc<dyn Extractor>>) -> Self {
        Self::with_concurrency(extractor, DEFAULT_EXTRACTION_CONCURRENCY)
    }

    /// Extractions beyond `concurrency` queue for a permit; none are dropped.
    pub fn with_concurrency(extractor: Option<Arc<dyn Extractor>>, concurrency: usize) -> Self {
        Self {
            extractor,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.lock().is_empty()
    }

    fn spawn_extraction(&self, screenshot: String) -> Option<JoinHandle<Option<ExtractionResult>>> {
        let extractor = self.extractor.clone()?;
        let limiter = self.limiter.clone();
        Some(tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await.ok()?;
            match extractor.extract(&screenshot).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Extraction failed: {}", e);
                    None
                }
            }
        }))
    }

    /// Wait for every pending extraction and return the recorded steps.
    pub async fn finish(&self) -> Vec<OperationStep> {
        let pending = std::mem::take(&mut *self.steps.lock());
        let mut steps = Vec::with_capacity(pending.len());
        for step in pending {
            let extraction = match step.extraction {
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Extraction task failed: {}", e);
                        None
                    }
                },
                None => None,
            };
            steps.push(OperationStep {
                screenshot: step.screenshot,
                thought: step.thought,
                extraction,
            });
        }
        debug!("Joined {} operation steps", steps.len());
        steps
    }
}

#[async_trait]
impl Plugin for StepRecorder {
    fn name(&self) -> &str {
        "step-recorder"
    }

    async fn on_screenshot(&self, screenshot: &Screenshot) -> Result<(), RuntimeError> {
        let extraction = self.spawn_extraction(screenshot.base64.clone());
        self.steps.lock().push(PendingStep {
            screenshot: screenshot.base64.clone(),
            thought: None,
            extraction,
        });
        Ok(())
    }

    async fn on_operator_action(&self, params: &ExecuteParams) -> Result<(), RuntimeError> {
        if let Some(last) = self.steps.lock().last_mut() {
            last.thought = params.prediction.thought.clone();
        }
        Ok(())
    }
}

/// [`Extractor`] that asks a vision model to describe the screenshot.
pub struct VlmExtractor {
    provider: Arc<dyn VlmProvider>,
    params: GenerationParams,
    cancel: CancellationToken,
}

impl VlmExtractor {
    pub fn new(provider: Arc<dyn VlmProvider>, params: GenerationParams) -> Self {
        Self {
            provider,
            params,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl Extractor for VlmExtractor {
    async fn extract(&self, screenshot_base64: &str) -> Result<ExtractionResult, RuntimeError> {
        let messages = vec![
            Message::text("system", EXTRACTION_PROMPT),
            Message {
                role: "user".to_string(),
                parts: vec![
                    ContentPart::Text {
                        text: "Extract the key information from this image.".to_string(),
                    },
                    ContentPart::Image {
                        base64: screenshot_base64.to_string(),
                    },
                ],
            },
        ];
        let response = self
            .provider
            .generate(&messages, &self.params, &self.cancel)
            .await
            .map_err(provider_error)?;
        Ok(ExtractionResult {
            content: response.content.unwrap_or_default(),
        })
    }
}

/// Render steps as the numbered list used in the summary prompt.
pub fn format_steps(steps: &[OperationStep]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let mut lines = vec![format!("Step {}:", index + 1)];
            if let Some(thought) = &step.thought {
                lines.push(format!("Thought: {}", thought));
            }
            if let Some(extraction) = step.extraction.as_ref().filter(|e| !e.content.is_empty()) {
                lines.push(format!("Extracted Info: {}", extraction.content));
            }
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask a text model to summarize a finished run.
pub async fn summarize_steps(
    provider: &dyn VlmProvider,
    params: &GenerationParams,
    instruction: &str,
    steps: &[OperationStep],
    cancel: &CancellationToken,
) -> Result<String, RuntimeError> {
    let messages = vec![
        Message::text(
            "system",
            "Summarize the key information from the operation steps, highlighting the final result the user cares about.",
        ),
        Message::text("user", summary_prompt(instruction, &format_steps(steps))),
    ];
    let response = provider
        .generate(&messages, params, cancel)
        .await
        .map_err(provider_error)?;
    Ok(response.content.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use screen_pilot_parser::ParsedAction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowExtractor {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for SlowExtractor {
        async fn extract(&self, screenshot_base64: &str) -> Result<ExtractionResult, RuntimeError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if screenshot_base64 == "bad" {
                return Err(RuntimeError::Model("unreadable".to_string()));
            }
            Ok(ExtractionResult {
                content: format!("seen {}", screenshot_base64),
            })
        }
    }

    fn frame(base64: &str) -> Screenshot {
        Screenshot {
            base64: base64.to_string(),
            width: 10,
            height: 10,
            scale_factor: 1.0,
        }
    }

    fn action_with_thought(thought: &str) -> ExecuteParams {
        let mut prediction = ParsedAction::new("click");
        prediction.thought = Some(thought.to_string());
        ExecuteParams {
            prediction,
            screen_width: 10,
            screen_height: 10,
            scale_factor: 1.0,
        }
    }

    #[tokio::test]
    async fn test_steps_join_extractions_in_order() {
        let extractor = Arc::new(SlowExtractor {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let recorder = StepRecorder::new(Some(extractor));

        recorder.on_screenshot(&frame("a")).await.unwrap();
        recorder.on_operator_action(&action_with_thought("first")).await.unwrap();
        recorder.on_screenshot(&frame("bad")).await.unwrap();
        recorder.on_screenshot(&frame("c")).await.unwrap();

        let steps = recorder.finish().await;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].thought.as_deref(), Some("first"));
        assert_eq!(steps[0].extraction.as_ref().unwrap().content, "seen a");
        assert_eq!(steps[1].extraction, None);
        assert_eq!(steps[2].extraction.as_ref().unwrap().content, "seen c");
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let extractor = Arc::new(SlowExtractor {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let recorder = StepRecorder::with_concurrency(Some(extractor.clone()), 2);
        for i in 0..6 {
            recorder.on_screenshot(&frame(&i.to_string())).await.unwrap();
        }
        let steps = recorder.finish().await;
        assert_eq!(steps.len(), 6);
        assert!(steps.iter().all(|s| s.extraction.is_some()));
        assert!(extractor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_without_extractor_steps_have_no_extraction() {
        let recorder = StepRecorder::new(None);
        recorder.on_screenshot(&frame("a")).await.unwrap();
        let steps = recorder.finish().await;
        assert_eq!(steps[0].extraction, None);
    }

    #[test]
    fn test_format_steps() {
        let steps = vec![
            OperationStep {
                screenshot: "a".to_string(),
                thought: Some("open the menu".to_string()),
                extraction: Some(ExtractionResult {
                    content: "File Edit View".to_string(),
                }),
            },
            OperationStep {
                screenshot: "b".to_string(),
                thought: None,
                extraction: None,
            },
        ];
        assert_eq!(
            format_steps(&steps),
            "Step 1:\nThought: open the menu\nExtracted Info: File Edit View\n\nStep 2:"
        );
    }
}
