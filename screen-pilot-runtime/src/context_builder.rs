//! Projects session history into a bounded model request.

use crate::types::{ChatTurn, Conversation, ModelInput, Role, Speaker};
use tracing::debug;

/// Screenshots attached as images by default; older ones become text.
pub const DEFAULT_MAX_IMAGES: usize = 5;

/// Text that replaces a screenshot outside the image window.
pub const OMITTED_SCREENSHOT: &str = "[earlier screenshot omitted]";

/// Builds model input with a sliding image window.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_images: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGES)
    }
}

impl ContextBuilder {
    pub fn new(max_images: usize) -> Self {
        Self { max_images }
    }

    /// Build a request: the system prompt, then every turn in order. Only the
    /// most recent `max_images` screenshots carry their image.
    pub fn build(&self, system_prompt: &str, conversations: &[Conversation]) -> ModelInput {
        let total_screenshots = conversations.iter().filter(|c| c.has_screenshot()).count();
        let first_attached = total_screenshots.saturating_sub(self.max_images);

        let mut turns = Vec::with_capacity(conversations.len() + 1);
        let mut images = Vec::new();
        let mut screenshot_index = 0;

        if !system_prompt.is_empty() {
            turns.push(ChatTurn {
                role: Role::System,
                content: system_prompt.to_string(),
                image: None,
            });
        }

        for entry in conversations {
            match (&entry.from, &entry.screenshot_base64) {
                (Speaker::Human, Some(base64)) => {
                    let attached = screenshot_index >= first_attached;
                    screenshot_index += 1;
                    if attached {
                        turns.push(ChatTurn {
                            role: Role::User,
                            content: entry.value.clone(),
                            image: Some(images.len()),
                        });
                        images.push(base64.clone());
                    } else {
                        turns.push(ChatTurn {
                            role: Role::User,
                            content: OMITTED_SCREENSHOT.to_string(),
                            image: None,
                        });
                    }
                }
                (Speaker::Human, None) => turns.push(ChatTurn {
                    role: Role::User,
                    content: entry.value.clone(),
                    image: None,
                }),
                (Speaker::Gpt, _) => turns.push(ChatTurn {
                    role: Role::Assistant,
                    content: entry.value.clone(),
                    image: None,
                }),
            }
        }

        debug!(
            "Built model input: {} turns, {} of {} screenshots attached",
            turns.len(),
            images.len(),
            total_screenshots
        );

        ModelInput {
            conversations: turns,
            images,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{now_millis, Screenshot, Timing};

    fn shot(tag: &str) -> Conversation {
        Conversation::screenshot(
            &Screenshot {
                base64: tag.to_string(),
                width: 100,
                height: 100,
                scale_factor: 1.0,
            },
            Timing::since(now_millis()),
        )
    }

    fn reply(text: &str) -> Conversation {
        let mut entry = Conversation::instruction(text);
        entry.from = Speaker::Gpt;
        entry
    }

    #[test]
    fn test_system_prompt_comes_first() {
        let input = ContextBuilder::default().build(
            "You are a GUI agent",
            &[Conversation::instruction("open settings")],
        );
        assert_eq!(input.conversations[0].role, Role::System);
        assert_eq!(input.conversations[1].role, Role::User);
        assert_eq!(input.conversations[1].content, "open settings");
        assert!(input.images.is_empty());
    }

    #[test]
    fn test_window_keeps_most_recent_images() {
        let mut history = vec![Conversation::instruction("task")];
        for i in 0..7 {
            history.push(shot(&format!("img{i}")));
            history.push(reply(&format!("step {i}")));
        }

        let input = ContextBuilder::new(5).build("sys", &history);
        assert_eq!(input.images, vec!["img2", "img3", "img4", "img5", "img6"]);

        let omitted = input
            .conversations
            .iter()
            .filter(|t| t.content == OMITTED_SCREENSHOT)
            .count();
        assert_eq!(omitted, 2);
        // every text turn is kept
        assert_eq!(input.conversations.len(), 1 + history.len());
    }

    #[test]
    fn test_image_indices_follow_turn_order() {
        let history = vec![shot("a"), reply("r"), shot("b")];
        let input = ContextBuilder::new(5).build("", &history);
        let indices: Vec<usize> = input.conversations.iter().filter_map(|t| t.image).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(input.images, vec!["a", "b"]);
    }

    #[test]
    fn test_fewer_screenshots_than_window() {
        let input = ContextBuilder::new(5).build("", &[shot("only")]);
        assert_eq!(input.images, vec!["only"]);
    }
}
