//! Parsed action records and the action vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named string inputs of an action (`start_box`, `content`, `direction`, ...).
pub type ActionInputs = BTreeMap<String, String>;

/// One action requested by the model.
///
/// `action_type` is kept verbatim, including names outside the known vocabulary,
/// so the caller decides what to do with unsupported actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAction {
    pub action_type: String,
    #[serde(default)]
    pub action_inputs: ActionInputs,
    pub thought: Option<String>,
    pub reflection: Option<String>,
}

impl ParsedAction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            action_inputs: ActionInputs::new(),
            thought: None,
            reflection: None,
        }
    }

    /// Builder-style input setter, mostly for tests and synthetic actions.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.action_inputs.insert(key.into(), value.into());
        self
    }

    pub fn input(&self, key: &str) -> Option<&str> {
        self.action_inputs
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn kind(&self) -> ActionKind {
        ActionKind::from_name(&self.action_type)
    }
}

/// Known action names, with the aliases different backends emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    LeftDouble,
    RightSingle,
    MiddleClick,
    Hover,
    Drag,
    Type,
    Hotkey,
    Scroll,
    Wait,
    Navigate,
    Finished,
    CallUser,
    ErrorEnv,
    MaxLoop,
    Unknown,
}

impl ActionKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "click" | "left_click" | "left_single" => Self::Click,
            "left_double" | "double_click" => Self::LeftDouble,
            "right_single" | "right_click" => Self::RightSingle,
            "middle_click" => Self::MiddleClick,
            "hover" | "mouse_move" => Self::Hover,
            "drag" | "select" | "left_click_drag" => Self::Drag,
            "type" => Self::Type,
            "hotkey" => Self::Hotkey,
            "scroll" => Self::Scroll,
            "wait" => Self::Wait,
            "navigate" => Self::Navigate,
            "finished" => Self::Finished,
            "call_user" => Self::CallUser,
            "error_env" => Self::ErrorEnv,
            "max_loop" => Self::MaxLoop,
            _ => Self::Unknown,
        }
    }

    /// Actions that end a run once dispatched.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::CallUser | Self::ErrorEnv | Self::MaxLoop
        )
    }

    /// Actions that need a resolved `start_box` to be executed.
    pub fn needs_pointer(self) -> bool {
        matches!(
            self,
            Self::Click
                | Self::LeftDouble
                | Self::RightSingle
                | Self::MiddleClick
                | Self::Hover
                | Self::Drag
        )
    }
}

/// Split `type` content into the text to type and whether Enter follows.
///
/// A trailing escaped `\n` (backslash + `n`, as the model writes it) or a real
/// trailing newline both mean "submit after typing".
pub fn split_submit(content: &str) -> (String, bool) {
    let body = content.trim_start().trim_end_matches([' ', '\t']);
    if let Some(text) = body.strip_suffix("\\n") {
        return (text.trim_end().to_string(), true);
    }
    if let Some(text) = body.strip_suffix('\n') {
        return (text.trim_end().to_string(), true);
    }
    (body.trim_end().to_string(), false)
}

/// Split a hotkey spec such as `ctrl+shift t` into lowercase key tokens.
///
/// Multi-word names the models use (`page down`, `page up`) are kept together.
pub fn split_hotkey(keys: &str) -> Vec<String> {
    let lowered = keys
        .to_ascii_lowercase()
        .replace("page down", "pagedown")
        .replace("page up", "pageup");
    lowered
        .split(|ch: char| ch.is_whitespace() || ch == '+')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!(ActionKind::from_name("left_single"), ActionKind::Click);
        assert_eq!(ActionKind::from_name("double_click"), ActionKind::LeftDouble);
        assert_eq!(ActionKind::from_name(" Finished "), ActionKind::Finished);
        assert_eq!(ActionKind::from_name("teleport"), ActionKind::Unknown);
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(ActionKind::Finished.is_terminal());
        assert!(ActionKind::CallUser.is_terminal());
        assert!(ActionKind::ErrorEnv.is_terminal());
        assert!(ActionKind::MaxLoop.is_terminal());
        assert!(!ActionKind::Wait.is_terminal());
        assert!(!ActionKind::Click.is_terminal());
    }

    #[test]
    fn test_split_submit_escaped_newline() {
        assert_eq!(split_submit("hello\\n"), ("hello".to_string(), true));
        assert_eq!(split_submit("hello\n"), ("hello".to_string(), true));
        assert_eq!(split_submit("  hello  "), ("hello".to_string(), false));
    }

    #[test]
    fn test_split_hotkey() {
        assert_eq!(split_hotkey("ctrl+c"), vec!["ctrl", "c"]);
        assert_eq!(split_hotkey("Ctrl Shift T"), vec!["ctrl", "shift", "t"]);
        assert_eq!(split_hotkey("page down"), vec!["pagedown"]);
        assert!(split_hotkey("  ").is_empty());
    }

    #[test]
    fn test_empty_input_is_absent() {
        let action = ParsedAction::new("click").with_input("start_box", "");
        assert_eq!(action.input("start_box"), None);
    }
}
