//! Core type definitions for the screen agent runtime.

use screen_pilot_parser::ParsedAction;
use serde::{Deserialize, Serialize};

/// Text stored in a screenshot turn in place of the image itself.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// Lifecycle of one agent run.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Init,
    Running,
    MaxLoop,
    End,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::MaxLoop | Self::End | Self::Error)
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Gpt,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotContext {
    pub size: Size,
    pub scale_factor: f64,
}

/// Wall-clock span of a turn, epoch milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub start: i64,
    pub end: i64,
    pub cost: i64,
}

impl Timing {
    /// Span from `start` to now.
    pub fn since(start: i64) -> Self {
        let end = now_millis();
        Self {
            start,
            end,
            cost: end - start,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One turn of the run's history. Immutable once appended to a session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub from: Speaker,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_context: Option<ScreenshotContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_parsed: Option<Vec<ParsedAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

impl Conversation {
    /// The opening turn carrying the user's instruction.
    pub fn instruction(text: &str) -> Self {
        Self {
            from: Speaker::Human,
            value: text.to_string(),
            screenshot_base64: None,
            screenshot_context: None,
            prediction_parsed: None,
            timing: None,
        }
    }

    pub fn screenshot(screenshot: &Screenshot, timing: Timing) -> Self {
        Self {
            from: Speaker::Human,
            value: IMAGE_PLACEHOLDER.to_string(),
            screenshot_base64: Some(screenshot.base64.clone()),
            screenshot_context: Some(screenshot.context()),
            prediction_parsed: None,
            timing: Some(timing),
        }
    }

    pub fn prediction(
        summary: String,
        parsed: Vec<ParsedAction>,
        context: ScreenshotContext,
        timing: Timing,
    ) -> Self {
        Self {
            from: Speaker::Gpt,
            value: summary,
            screenshot_base64: None,
            screenshot_context: Some(context),
            prediction_parsed: Some(parsed),
            timing: Some(timing),
        }
    }

    pub fn has_screenshot(&self) -> bool {
        self.screenshot_base64.is_some()
    }
}

/// A frame captured from a surface.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl Screenshot {
    /// A frame is usable only with image data and a non-empty size.
    pub fn is_valid(&self) -> bool {
        !self.base64.is_empty() && self.width > 0 && self.height > 0
    }

    pub fn context(&self) -> ScreenshotContext {
        ScreenshotContext {
            size: Size {
                width: self.width,
                height: self.height,
            },
            scale_factor: self.scale_factor,
        }
    }
}

/// One action handed to a surface, with the geometry of the frame it was predicted on.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteParams {
    pub prediction: ParsedAction,
    pub screen_width: u32,
    pub screen_height: u32,
    pub scale_factor: f64,
}

/// Role of a message sent to the model.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a model request. `image` indexes into [`ModelInput::images`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<usize>,
}

/// Payload for one model call.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ModelInput {
    pub conversations: Vec<ChatTurn>,
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    pub prediction: String,
    pub parsed_predictions: Vec<ParsedAction>,
}

/// Snapshot of a session as delivered to observers.
///
/// `conversations` holds only the entries appended since the previous
/// notification; it is empty for status and error changes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: AgentStatus,
    pub instruction: String,
    pub system_prompt: String,
    pub model_name: String,
    pub log_time: i64,
    pub conversations: Vec<Conversation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
}

/// Payload of the error sink.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorReport {
    pub code: i32,
    pub error: String,
    pub stack: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn frame(base64: &str, width: u32, height: u32) -> Screenshot {
        Screenshot {
            base64: base64.to_string(),
            width,
            height,
            scale_factor: 1.0,
        }
    }

    #[test]
    fn test_screenshot_validity() {
        assert!(frame("AAAA", 1280, 720).is_valid());
        assert!(!frame("", 1280, 720).is_valid());
        assert!(!frame("AAAA", 0, 720).is_valid());
        assert!(!frame("AAAA", 1280, 0).is_valid());
    }

    #[test]
    fn test_conversation_serialization_shape() {
        let entry = Conversation::screenshot(&frame("AAAA", 1280, 720), Timing::since(now_millis()));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["from"], "human");
        assert_eq!(value["value"], IMAGE_PLACEHOLDER);
        assert_eq!(value["screenshotBase64"], "AAAA");
        assert_eq!(value["screenshotContext"]["size"]["width"], 1280);
        assert_eq!(value["screenshotContext"]["scaleFactor"], 1.0);
        assert!(value.get("predictionParsed").is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AgentStatus::MaxLoop).unwrap(), r#""max_loop""#);
        assert!(AgentStatus::End.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
    }

    #[test]
    fn test_instruction_turn_has_no_screenshot() {
        let entry = Conversation::instruction("open the settings");
        assert_eq!(entry.from, Speaker::Human);
        assert!(!entry.has_screenshot());
    }
}
