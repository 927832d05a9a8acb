//! [`Surface`] over the local Wayland desktop.

use crate::interfaces::{RuntimeError, Surface};
use crate::metrics::{MetricTimer, ACTION_EXECUTE_LATENCY, SCREENSHOT_LATENCY};
use crate::run_context::RunContext;
use crate::types::{ExecuteParams, Screenshot};
use async_trait::async_trait;
use base64::Engine;
use screen_pilot_desktop::{self as desktop, MouseButton, OsError, ScrollDirection};
use screen_pilot_parser::{box_to_screen_coords, split_hotkey, split_submit, ActionKind};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wheel steps per scroll action.
const SCROLL_STEPS: i32 = 5;

fn os_error(err: OsError) -> RuntimeError {
    RuntimeError::Execute(err.to_string())
}

/// Page to open for a navigate action. Bare queries go to the run's search engine.
fn navigation_url(params: &ExecuteParams, ctx: &RunContext) -> Option<String> {
    let target = params.prediction.input("url")?.trim();
    if target.is_empty() {
        return None;
    }
    Some(desktop::navigation_url(target, &ctx.search_engine))
}

/// Drives the focused Wayland session through `screen-pilot-desktop`.
///
/// Boxes map to physical pixels (`logical * scale_factor`). Compositor pointer
/// tools take logical coordinates, so positions are divided back by the scale
/// unless `physical_pointer` is set.
#[derive(Debug, Clone, Default)]
pub struct DesktopSurface {
    physical_pointer: bool,
}

impl DesktopSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_physical_pointer(mut self, physical_pointer: bool) -> Self {
        self.physical_pointer = physical_pointer;
        self
    }

    /// Pointer position for a box input, or `None` when the box is absent or empty.
    pub fn pointer_position(&self, box_str: Option<&str>, params: &ExecuteParams) -> Option<(i32, i32)> {
        let point = box_to_screen_coords(
            box_str?,
            f64::from(params.screen_width),
            f64::from(params.screen_height),
            params.scale_factor,
        )?;
        let divisor = if self.physical_pointer || params.scale_factor <= 0.0 {
            1.0
        } else {
            params.scale_factor
        };
        Some((
            (point.x / divisor).round() as i32,
            (point.y / divisor).round() as i32,
        ))
    }

    fn require_position(
        &self,
        key: &str,
        params: &ExecuteParams,
    ) -> Result<(i32, i32), RuntimeError> {
        self.pointer_position(params.prediction.input(key), params)
            .ok_or_else(|| RuntimeError::MissingCoordinates(params.prediction.action_type.clone()))
    }
}

#[async_trait]
impl Surface for DesktopSurface {
    async fn screenshot(&self, _ctx: &RunContext) -> Result<Screenshot, RuntimeError> {
        let _timer = MetricTimer::new(SCREENSHOT_LATENCY);
        let capture = desktop::capture_screen()
            .await
            .map_err(|e| RuntimeError::Screenshot(e.to_string()))?;
        debug!(
            "Desktop screenshot {}x{} (scale {})",
            capture.width, capture.height, capture.scale_factor
        );
        Ok(Screenshot {
            base64: base64::engine::general_purpose::STANDARD.encode(&capture.png),
            width: capture.width,
            height: capture.height,
            scale_factor: capture.scale_factor,
        })
    }

    async fn execute(&self, params: &ExecuteParams, ctx: &RunContext) -> Result<(), RuntimeError> {
        if ctx.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let _timer = MetricTimer::new(ACTION_EXECUTE_LATENCY);
        let action = &params.prediction;
        let kind = action.kind();

        match kind {
            ActionKind::Click | ActionKind::RightSingle | ActionKind::MiddleClick => {
                let (x, y) = self.require_position("start_box", params)?;
                let button = match kind {
                    ActionKind::RightSingle => MouseButton::Right,
                    ActionKind::MiddleClick => MouseButton::Middle,
                    _ => MouseButton::Left,
                };
                info!("{} at ({}, {})", action.action_type, x, y);
                desktop::click_at(x, y, button).await.map_err(os_error)
            }
            ActionKind::LeftDouble => {
                let (x, y) = self.require_position("start_box", params)?;
                info!("double click at ({}, {})", x, y);
                desktop::double_click_at(x, y).await.map_err(os_error)
            }
            ActionKind::Hover => {
                let (x, y) = self.require_position("start_box", params)?;
                desktop::mouse_move_absolute(x, y).await.map_err(os_error)
            }
            ActionKind::Drag => {
                let from = self.require_position("start_box", params)?;
                let to = self.require_position("end_box", params)?;
                info!("drag {:?} -> {:?}", from, to);
                desktop::drag(from, to).await.map_err(os_error)
            }
            ActionKind::Type => {
                let (text, submit) = split_submit(action.input("content").unwrap_or_default());
                if text.is_empty() && !submit {
                    warn!("type action without content");
                    return Ok(());
                }
                info!("type {:?} (submit: {})", text, submit);
                desktop::type_text(&text).await.map_err(os_error)?;
                if submit {
                    desktop::key_press("enter").await.map_err(os_error)?;
                }
                Ok(())
            }
            ActionKind::Hotkey => {
                let keys = split_hotkey(
                    action
                        .input("key")
                        .or_else(|| action.input("hotkey"))
                        .unwrap_or_default(),
                );
                if keys.is_empty() {
                    warn!("hotkey action without keys");
                    return Ok(());
                }
                if let Err(err) = desktop::input::chord_args(&keys) {
                    warn!("Unsupported hotkey {:?}: {}", keys, err);
                    return Ok(());
                }
                info!("hotkey {:?}", keys);
                desktop::key_combo(&keys).await.map_err(os_error)
            }
            ActionKind::Scroll => {
                let raw = action.input("direction").unwrap_or("down");
                let Ok(direction) = ScrollDirection::parse(raw) else {
                    warn!("Unsupported scroll direction: {}", raw);
                    return Ok(());
                };
                let at = self.pointer_position(action.input("start_box"), params);
                info!("scroll {:?} at {:?}", direction, at);
                desktop::scroll_at(at, direction, SCROLL_STEPS)
                    .await
                    .map_err(os_error)
            }
            ActionKind::Navigate => {
                let Some(url) = navigation_url(params, ctx) else {
                    warn!("navigate action without url");
                    return Ok(());
                };
                info!("navigate to {}", url);
                desktop::open_url(&url).await.map_err(os_error)
            }
            ActionKind::Wait => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => Err(RuntimeError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(1)) => Ok(()),
                }
            }
            ActionKind::Finished | ActionKind::CallUser | ActionKind::ErrorEnv | ActionKind::MaxLoop => {
                debug!("{} needs no desktop input", action.action_type);
                Ok(())
            }
            ActionKind::Unknown => {
                warn!("Unsupported action type: {}", action.action_type);
                Ok(())
            }
        }
    }
}
