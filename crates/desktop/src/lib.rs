//! Wayland desktop control for the screen agent.
//!
//! Thin, validated wrappers over the compositor tools:
//! - Screen capture (`grim`, `hyprshot`) and monitor scale (`hyprctl`)
//! - Pointer and keyboard input (`wlrctl`, `ydotool`, `wtype`)
//! - Opening URLs (`xdg-open`)

pub mod browser;
pub mod capture;
pub mod input;
mod process;

pub use browser::{navigation_url, open_url, search_url};
pub use capture::{capture_screen, monitor_scale, png_dimensions, Capture};
pub use input::{
    click_at, double_click_at, drag, key_combo, key_press, mouse_click, mouse_move_absolute,
    scroll_at, type_text, MouseButton, ScrollDirection,
};

#[derive(Debug, thiserror::Error)]
pub enum OsError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OsResult<T> = Result<T, OsError>;
