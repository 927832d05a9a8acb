//! Normalized box coordinates and their projection onto a screen.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex"));

/// A box in `[0,1]` space. A single point is a degenerate box (`x1 == x2`, `y1 == y2`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Pixel position on the target surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Pull the numbers out of a box literal such as `[1,2,3,4]`, `(1,2)` or
/// `<|box_start|>(1,2)<|box_end|>`.
pub(crate) fn extract_numbers(raw: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

impl NormalizedBox {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x,
            y2: y,
        }
    }

    /// Build a box from 2 (point) or 4+ (box) raw numbers, dividing each axis by
    /// its factor and clamping into `[0,1]`.
    pub fn from_raw(numbers: &[f64], factor_x: f64, factor_y: f64) -> Option<Self> {
        let scale = |value: f64, factor: f64| {
            let factor = if factor > 0.0 { factor } else { 1.0 };
            (value / factor).clamp(0.0, 1.0)
        };
        match numbers {
            [x, y] => Some(Self::point(scale(*x, factor_x), scale(*y, factor_y))),
            [x1, y1, x2, y2, ..] => Some(Self {
                x1: scale(*x1, factor_x),
                y1: scale(*y1, factor_y),
                x2: scale(*x2, factor_x),
                y2: scale(*y2, factor_y),
            }),
            _ => None,
        }
    }

    /// Parse an already-normalized box string (the parser's output format).
    pub fn parse(box_str: &str) -> Option<Self> {
        let numbers = extract_numbers(box_str);
        Self::from_raw(&numbers, 1.0, 1.0)
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Canonical `[x1,y1,x2,y2]` form stored in `action_inputs`.
    pub fn to_input_string(&self) -> String {
        format!("[{},{},{},{}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Map a normalized box string onto surface pixels, resolving to the box center.
///
/// Returns `None` for an empty or unparseable box; callers must fail only the
/// action that needed the coordinates.
pub fn box_to_screen_coords(
    box_str: &str,
    screen_width: f64,
    screen_height: f64,
    scale_factor: f64,
) -> Option<ScreenPoint> {
    if box_str.trim().is_empty() {
        return None;
    }
    let normalized = NormalizedBox::parse(box_str)?;
    let (cx, cy) = normalized.center();
    Some(ScreenPoint {
        x: cx * screen_width * scale_factor,
        y: cy * screen_height * scale_factor,
    })
}
