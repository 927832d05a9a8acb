//! Pointer and keyboard input.

use crate::process::{command_exists, run_checked};
use crate::{OsError, OsResult};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn wlrctl_name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }

    /// ydotool button id; OR with 0x40 (down), 0x80 (up) or 0xC0 (click).
    fn ydotool_id(self) -> u8 {
        match self {
            Self::Left => 0x00,
            Self::Right => 0x01,
            Self::Middle => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(direction: &str) -> OsResult<Self> {
        match direction.trim().to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(OsError::InvalidArgument(format!(
                "unsupported scroll direction: {other}"
            ))),
        }
    }

    /// `(dx, dy)` in wheel steps, positive meaning right/down.
    fn delta(self, amount: i32) -> (i32, i32) {
        match self {
            Self::Up => (0, -amount),
            Self::Down => (0, amount),
            Self::Left => (-amount, 0),
            Self::Right => (amount, 0),
        }
    }
}

fn validate_text(text: &str) -> OsResult<()> {
    if text.contains('\0') {
        return Err(OsError::InvalidArgument(
            "text contains null byte".to_string(),
        ));
    }
    Ok(())
}

fn validate_key_token(key: &str) -> OsResult<()> {
    if key.trim().is_empty() {
        return Err(OsError::InvalidArgument("key cannot be empty".to_string()));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'))
    {
        return Err(OsError::InvalidArgument(format!(
            "key contains invalid characters: {key}"
        )));
    }
    Ok(())
}

fn validate_coordinate(value: i32, label: &str) -> OsResult<()> {
    if value < 0 {
        return Err(OsError::InvalidArgument(format!(
            "{label} must be >= 0, got {value}"
        )));
    }
    Ok(())
}

fn is_modifier(key: &str) -> bool {
    matches!(key, "ctrl" | "shift" | "alt" | "logo" | "altgr")
}

/// Map a model key name onto the name `wtype` expects. Modifiers stay
/// lowercase (`wtype -M ctrl`); other keys become XKB keysyms.
pub fn keysym(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    let mapped = match lower.as_str() {
        "control" | "ctrl" | "lctrl" | "rctrl" => "ctrl",
        "shift" | "lshift" | "rshift" => "shift",
        "alt" | "option" | "lalt" | "ralt" => "alt",
        "meta" | "super" | "win" | "cmd" | "command" => "logo",
        "enter" | "return" => "Return",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "home" => "Home",
        "end" => "End",
        "pagedown" | "page_down" => "Page_Down",
        "pageup" | "page_up" => "Page_Up",
        "up" | "arrowup" => "Up",
        "down" | "arrowdown" => "Down",
        "left" | "arrowleft" => "Left",
        "right" | "arrowright" => "Right",
        _ => "",
    };
    if !mapped.is_empty() {
        return mapped.to_string();
    }
    if lower.len() > 1 && lower.starts_with('f') && lower[1..].chars().all(|c| c.is_ascii_digit())
    {
        return lower.to_uppercase();
    }
    lower
}

/// Build the `wtype` argument list for a chord: press modifiers, tap the
/// remaining keys in order, release modifiers in reverse.
pub fn chord_args(keys: &[String]) -> OsResult<Vec<String>> {
    if keys.is_empty() {
        return Err(OsError::InvalidArgument(
            "key combination cannot be empty".to_string(),
        ));
    }
    let mapped: Vec<String> = keys.iter().map(|key| keysym(key)).collect();
    for key in &mapped {
        validate_key_token(key)?;
    }

    let (modifiers, others): (Vec<&String>, Vec<&String>) =
        mapped.iter().partition(|key| is_modifier(key));

    let mut args: Vec<String> = Vec::new();
    for modifier in &modifiers {
        args.push("-M".to_string());
        args.push(modifier.to_string());
    }
    for key in &others {
        args.push("-k".to_string());
        args.push(key.to_string());
    }
    for modifier in modifiers.iter().rev() {
        args.push("-m".to_string());
        args.push(modifier.to_string());
    }
    Ok(args)
}

/// Type text into the currently focused window.
pub async fn type_text(text: &str) -> OsResult<()> {
    validate_text(text)?;
    if text.is_empty() {
        return Ok(());
    }
    if command_exists("wtype").await {
        return run_checked("wtype", &["--", text]).await;
    }
    if command_exists("ydotool").await {
        return run_checked("ydotool", &["type", "--", text]).await;
    }
    Err(OsError::NotFound(
        "No text input backend found (install 'wtype' or 'ydotool')".to_string(),
    ))
}

/// Press a single key in the focused window.
pub async fn key_press(key: &str) -> OsResult<()> {
    key_combo(&[key.to_string()]).await
}

/// Press a key combination, e.g. `["ctrl", "l"]`.
pub async fn key_combo(keys: &[String]) -> OsResult<()> {
    let args = chord_args(keys)?;
    if !command_exists("wtype").await {
        return Err(OsError::NotFound(
            "wtype not found for key presses".to_string(),
        ));
    }
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_checked("wtype", &arg_refs).await
}

/// Move cursor to an absolute coordinate.
pub async fn mouse_move_absolute(x: i32, y: i32) -> OsResult<()> {
    validate_coordinate(x, "x")?;
    validate_coordinate(y, "y")?;

    let xs = x.to_string();
    let ys = y.to_string();

    if command_exists("wlrctl").await {
        return run_checked("wlrctl", &["pointer", "move", &xs, &ys]).await;
    }
    if command_exists("ydotool").await {
        return run_checked("ydotool", &["mousemove", "--absolute", "-x", &xs, "-y", &ys]).await;
    }
    Err(OsError::NotFound(
        "No mouse move backend found (install 'wlrctl' or 'ydotool')".to_string(),
    ))
}

/// Click a button at the current cursor position.
pub async fn mouse_click(button: MouseButton) -> OsResult<()> {
    if command_exists("ydotool").await {
        let code = format!("0x{:02X}", 0xC0 | button.ydotool_id());
        return run_checked("ydotool", &["click", &code]).await;
    }
    if command_exists("wlrctl").await {
        return run_checked("wlrctl", &["pointer", "click", button.wlrctl_name()]).await;
    }
    Err(OsError::NotFound(
        "No click backend found (install 'ydotool' or 'wlrctl')".to_string(),
    ))
}

/// Move to a coordinate and click.
pub async fn click_at(x: i32, y: i32, button: MouseButton) -> OsResult<()> {
    mouse_move_absolute(x, y).await?;
    // Let the compositor settle the cursor before clicking.
    sleep(Duration::from_millis(100)).await;
    mouse_click(button).await
}

pub async fn double_click_at(x: i32, y: i32) -> OsResult<()> {
    click_at(x, y, MouseButton::Left).await?;
    sleep(Duration::from_millis(50)).await;
    mouse_click(MouseButton::Left).await
}

/// Press the left button at `from`, move to `to`, release.
pub async fn drag(from: (i32, i32), to: (i32, i32)) -> OsResult<()> {
    if !command_exists("ydotool").await {
        return Err(OsError::NotFound(
            "ydotool not found for drag".to_string(),
        ));
    }
    mouse_move_absolute(from.0, from.1).await?;
    sleep(Duration::from_millis(100)).await;
    run_checked("ydotool", &["click", "0x40"]).await?;
    let moved = mouse_move_absolute(to.0, to.1).await;
    sleep(Duration::from_millis(100)).await;
    // Always release, even when the move failed.
    run_checked("ydotool", &["click", "0x80"]).await?;
    moved
}

/// Scroll `amount` wheel steps, optionally moving to `at` first.
pub async fn scroll_at(
    at: Option<(i32, i32)>,
    direction: ScrollDirection,
    amount: i32,
) -> OsResult<()> {
    if let Some((x, y)) = at {
        mouse_move_absolute(x, y).await?;
        sleep(Duration::from_millis(50)).await;
    }
    let (dx, dy) = direction.delta(amount);
    if command_exists("wlrctl").await {
        let (dy, dx) = (dy.to_string(), dx.to_string());
        return run_checked("wlrctl", &["pointer", "scroll", &dy, &dx]).await;
    }
    if command_exists("ydotool").await {
        // ydotool wheel is positive towards up/left.
        let (x, y) = ((-dx).to_string(), (-dy).to_string());
        return run_checked("ydotool", &["mousemove", "--wheel", "-x", &x, "-y", &y]).await;
    }
    Err(OsError::NotFound(
        "No scroll backend found (install 'wlrctl' or 'ydotool')".to_string(),
    ))
}
