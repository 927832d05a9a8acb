//! Screen capture and display geometry.

use crate::process::{command_exists, run_bytes, run_output};
use crate::{OsError, OsResult};
use serde_json::Value;
use tracing::debug;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A captured frame. `width`/`height` are logical pixels; the PNG itself is
/// at physical resolution (`logical * scale_factor`).
#[derive(Debug, Clone)]
pub struct Capture {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

/// Read the pixel size from a PNG's IHDR chunk.
pub fn png_dimensions(png: &[u8]) -> OsResult<(u32, u32)> {
    if png.len() < 24 || png[..8] != PNG_SIGNATURE {
        return Err(OsError::InvalidArgument("not a PNG image".to_string()));
    }
    if &png[12..16] != b"IHDR" {
        return Err(OsError::InvalidArgument(
            "PNG is missing its IHDR chunk".to_string(),
        ));
    }
    let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    if width == 0 || height == 0 {
        return Err(OsError::InvalidArgument(format!(
            "PNG has empty dimensions {width}x{height}"
        )));
    }
    Ok((width, height))
}

/// Scale of the focused monitor from `hyprctl monitors -j` output.
pub fn parse_monitor_scale(monitors: &Value) -> Option<f64> {
    let monitors = monitors.as_array()?;
    let focused = monitors
        .iter()
        .find(|m| m["focused"].as_bool().unwrap_or(false))
        .or_else(|| monitors.first())?;
    focused["scale"].as_f64().filter(|scale| *scale > 0.0)
}

/// Output scale of the focused monitor, or 1.0 when it cannot be determined.
pub async fn monitor_scale() -> f64 {
    if !command_exists("hyprctl").await {
        return 1.0;
    }
    let Ok(raw) = run_output("hyprctl", &["monitors", "-j"]).await else {
        return 1.0;
    };
    serde_json::from_str::<Value>(&raw)
        .ok()
        .as_ref()
        .and_then(parse_monitor_scale)
        .unwrap_or(1.0)
}

/// Capture the whole screen as PNG.
pub async fn capture_screen() -> OsResult<Capture> {
    let png = if command_exists("grim").await {
        run_bytes("grim", &["-t", "png", "-"]).await?
    } else if command_exists("hyprshot").await {
        capture_with_hyprshot().await?
    } else {
        return Err(OsError::NotFound(
            "No screenshot backend found (install 'grim' or 'hyprshot')".to_string(),
        ));
    };

    let (physical_width, physical_height) = png_dimensions(&png)?;
    let scale_factor = monitor_scale().await;
    let width = (physical_width as f64 / scale_factor).round() as u32;
    let height = (physical_height as f64 / scale_factor).round() as u32;
    debug!(
        "Captured {}x{} (logical {}x{}, scale {})",
        physical_width, physical_height, width, height, scale_factor
    );

    Ok(Capture {
        png,
        width,
        height,
        scale_factor,
    })
}

async fn capture_with_hyprshot() -> OsResult<Vec<u8>> {
    let dir = std::env::temp_dir();
    let file_name = format!(
        "screen-pilot-{}.png",
        chrono::Utc::now().timestamp_millis()
    );
    let dir_str = dir.to_string_lossy().to_string();
    run_bytes(
        "hyprshot",
        &["-m", "output", "--silent", "-o", &dir_str, "-f", &file_name],
    )
    .await?;

    let path = dir.join(&file_name);
    let png = tokio::fs::read(&path).await?;
    let _ = tokio::fs::remove_file(&path).await;
    Ok(png)
}
