//! Action grammar for vision-language model replies.
//!
//! A reply looks like:
//!
//! ```text
//! Thought: Click the search box
//! Action: click(start_box='(72,646)')
//! ```
//!
//! [`parse_prediction`] turns that text into [`ParsedAction`] records whose box
//! inputs are normalized into `[0,1]` space, and [`coords`] maps those boxes back
//! onto a concrete screen.

pub mod action;
pub mod coords;
pub mod parser;

pub use action::{split_hotkey, split_submit, ActionInputs, ActionKind, ParsedAction};
pub use coords::{box_to_screen_coords, NormalizedBox, ScreenPoint};
pub use parser::{get_summary, parse_prediction, Factor, ParseOptions, ParseOutput, ScreenContext};
