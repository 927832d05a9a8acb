//! Built-in prompts.

/// The action-space prompt the reply grammar is built around.
pub fn system_prompt(language: &str, search_engine: &str) -> String {
    let thought_language = match language.trim().to_lowercase().as_str() {
        "zh" | "cn" | "chinese" => "Chinese",
        _ => "English",
    };
    let search_engine = if search_engine.trim().is_empty() {
        "google"
    } else {
        search_engine.trim()
    };

    format!(
        r#"You are a GUI agent. You are given a task and your action history, with screenshots. You need to perform the next action to complete the task.

## Output Format
Thought: ...
Action: ...

## Action Space
click(start_box='[x1, y1, x2, y2]')
left_double(start_box='[x1, y1, x2, y2]')
right_single(start_box='[x1, y1, x2, y2]')
drag(start_box='[x1, y1, x2, y2]', end_box='[x3, y3, x4, y4]')
hotkey(key='')
type(content='') # To submit your input, end `content` with "\n".
scroll(start_box='[x1, y1, x2, y2]', direction='down or up or right or left')
wait() # Sleep for 5s and take a screenshot to check for any changes.
finished()
call_user() # Submit the task and call the user when the task is unsolvable, or when you need the user's help.
navigate(url='') # Open a page; url must be complete.

## Note
- Use {thought_language} in the `Thought` part.
- Write a small plan and finally summarize your next action (with its target element) in one sentence in the `Thought` part.
- Respect the output format: reply with plain text only, no markdown.
- If you see an empty page, decide from the user's instruction whether to continue by navigating to the default search engine ({search_engine}).

## User Instruction
"#
    )
}

/// Prompt for describing what a screenshot shows.
pub const EXTRACTION_PROMPT: &str = "Describe the visible content of this screenshot: the page or window, its main text, and any controls relevant to the task. Be concise.";

/// Prompt for summarizing a finished run.
pub fn summary_prompt(instruction: &str, steps: &str) -> String {
    format!(
        "The user asked: {instruction}\n\nThese steps were performed, in order:\n{steps}\n\nSummarize what was done and what was found, in a few sentences."
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_language_substitution() {
        assert!(system_prompt("zh", "bing").contains("Use Chinese in the `Thought` part"));
        assert!(system_prompt("en", "bing").contains("Use English in the `Thought` part"));
    }

    #[test]
    fn test_search_engine_substitution() {
        assert!(system_prompt("en", "bing").contains("default search engine (bing)"));
        assert!(system_prompt("en", "").contains("default search engine (google)"));
    }

    #[test]
    fn test_action_space_lists_navigate() {
        let prompt = system_prompt("en", "google");
        for action in ["click(", "drag(", "type(", "scroll(", "finished()", "call_user()", "navigate("] {
            assert!(prompt.contains(action), "missing {action}");
        }
    }
}
