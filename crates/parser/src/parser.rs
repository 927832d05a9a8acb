//! Parser for the `Thought: ... / Action: name(key='value')` reply format.

use crate::action::{ActionInputs, ParsedAction};
use crate::coords::{box_to_screen_coords, extract_numbers, NormalizedBox};
use once_cell::sync::Lazy;
use regex::Regex;

static ACTION_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*Action:").expect("action marker regex"));
static ACTION_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("action split regex"));
static THOUGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Thought:\s*(.*?)\s*(?:Reflection:|Action_Summary:|$)").expect("thought regex")
});
static REFLECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Reflection:\s*(.*?)\s*(?:Action_Summary:|Thought:|$)").expect("reflection regex")
});
static SUMMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Action_Summary:\s*(.*?)\s*(?:Reflection:|Thought:|$)").expect("summary regex")
});

/// Denominator the model was told to use for box coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Factor {
    Uniform(f64),
    PerAxis(f64, f64),
}

impl Factor {
    pub fn x(&self) -> f64 {
        match self {
            Self::Uniform(value) => *value,
            Self::PerAxis(x, _) => *x,
        }
    }

    pub fn y(&self) -> f64 {
        match self {
            Self::Uniform(value) => *value,
            Self::PerAxis(_, y) => *y,
        }
    }
}

impl Default for Factor {
    fn default() -> Self {
        Self::Uniform(1000.0)
    }
}

impl From<f64> for Factor {
    fn from(value: f64) -> Self {
        Self::Uniform(value)
    }
}

impl From<[f64; 2]> for Factor {
    fn from(value: [f64; 2]) -> Self {
        Self::PerAxis(value[0], value[1])
    }
}

impl From<(f64, f64)> for Factor {
    fn from(value: (f64, f64)) -> Self {
        Self::PerAxis(value.0, value.1)
    }
}

/// Logical size of the screen the prediction was made against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenContext {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct ParseOptions<'a> {
    pub prediction: &'a str,
    pub factor: Factor,
    /// When set, box inputs also get `start_coords` / `end_coords` in pixels.
    pub screen_context: Option<ScreenContext>,
    pub scale_factor: Option<f64>,
}

impl<'a> ParseOptions<'a> {
    pub fn new(prediction: &'a str, factor: impl Into<Factor>) -> Self {
        Self {
            prediction,
            factor: factor.into(),
            screen_context: None,
            scale_factor: None,
        }
    }

    pub fn with_screen(mut self, width: f64, height: f64, scale_factor: f64) -> Self {
        self.screen_context = Some(ScreenContext { width, height });
        self.scale_factor = Some(scale_factor);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub parsed: Vec<ParsedAction>,
}

/// Parse a raw model reply into zero or more actions.
///
/// Never fails: a reply without an `Action:` line yields no actions, malformed
/// calls inside the action block are skipped, and out-of-range coordinates are
/// clamped.
pub fn parse_prediction(options: &ParseOptions<'_>) -> ParseOutput {
    let text = options.prediction.trim();
    let Some(marker) = ACTION_MARKER_RE.find(text) else {
        return ParseOutput::default();
    };

    let (thought, reflection) = parse_preamble(&text[..marker.start()]);
    let action_block = &text[marker.end()..];

    let parsed = ACTION_SPLIT_RE
        .split(action_block)
        .map(|chunk| strip_action_marker(chunk.trim()))
        .filter(|chunk| !chunk.is_empty())
        .filter_map(parse_call)
        .map(|(action_type, raw_inputs)| ParsedAction {
            action_type,
            action_inputs: normalize_inputs(raw_inputs, options),
            thought: thought.clone(),
            reflection: reflection.clone(),
        })
        .collect();

    ParseOutput { parsed }
}

/// Condensed form of a reply stored in history: the `Reflection:` block is dropped.
pub fn get_summary(prediction: &str) -> String {
    let text = prediction.trim();
    let Some(start) = text.find("Reflection:") else {
        return text.to_string();
    };
    let rest = &text[start..];
    let end = ["Action_Summary:", "Thought:"]
        .iter()
        .filter_map(|label| rest.find(label))
        .chain(ACTION_MARKER_RE.find(rest).map(|m| m.start()))
        .min()
        .map(|offset| start + offset)
        .unwrap_or(text.len());
    format!("{}{}", &text[..start], &text[end..]).trim().to_string()
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_preamble(preamble: &str) -> (Option<String>, Option<String>) {
    let preamble = preamble.trim();
    let reflection = capture(&REFLECTION_RE, preamble);
    let thought = capture(&THOUGHT_RE, preamble).or_else(|| capture(&SUMMARY_RE, preamble));

    // Unlabelled text before the action line is still the model's reasoning.
    let thought = match thought {
        None if reflection.is_none() && !preamble.is_empty() => Some(preamble.to_string()),
        other => other,
    };
    (thought, reflection)
}

fn strip_action_marker(chunk: &str) -> &str {
    chunk.strip_prefix("Action:").map(str::trim).unwrap_or(chunk)
}

/// Split `name(k='v', k2="v2")` into the name and its raw arguments.
fn parse_call(call: &str) -> Option<(String, Vec<(String, String)>)> {
    let call = call.trim();
    let (name, args) = match call.find('(') {
        Some(open) => {
            let close = call.rfind(')').filter(|close| *close > open).unwrap_or(call.len());
            (&call[..open], &call[open + 1..close])
        }
        None => (call, ""),
    };
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }
    Some((name.to_string(), parse_args(args)))
}

fn parse_args(args: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = args.chars().collect();
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        let key_start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if key.is_empty() || i >= chars.len() || chars[i] != '=' {
            // Not a key=value pair; skip to the next top-level comma.
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            continue;
        }
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < chars.len() && (chars[i] == '\'' || chars[i] == '"') {
            let quote = chars[i];
            i += 1;
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == quote {
                    value.push(quote);
                    i += 2;
                    continue;
                }
                value.push(chars[i]);
                i += 1;
            }
            i += 1;
        } else {
            let mut depth = 0i32;
            while i < chars.len() {
                match chars[i] {
                    '(' | '[' => depth += 1,
                    ')' | ']' => depth -= 1,
                    ',' if depth <= 0 => break,
                    _ => {}
                }
                value.push(chars[i]);
                i += 1;
            }
            value = value.trim().to_string();
        }
        pairs.push((key, value));
    }

    pairs
}

fn box_key(key: &str) -> Option<&'static str> {
    match key {
        "start_box" | "point" | "start_point" => Some("start_box"),
        "end_box" | "end_point" => Some("end_box"),
        _ => None,
    }
}

fn normalize_inputs(raw: Vec<(String, String)>, options: &ParseOptions<'_>) -> ActionInputs {
    let mut inputs = ActionInputs::new();
    for (key, value) in raw {
        let Some(target) = box_key(&key) else {
            inputs.insert(key, value);
            continue;
        };
        let numbers = extract_numbers(&value);
        let Some(normalized) =
            NormalizedBox::from_raw(&numbers, options.factor.x(), options.factor.y())
        else {
            continue;
        };
        let box_str = normalized.to_input_string();

        if let Some(screen) = options.screen_context {
            let scale = options.scale_factor.unwrap_or(1.0);
            if let Some(point) = box_to_screen_coords(&box_str, screen.width, screen.height, scale) {
                let coords_key = if target == "start_box" { "start_coords" } else { "end_coords" };
                inputs.insert(coords_key.to_string(), format!("[{},{}]", point.x, point.y));
            }
        }
        inputs.insert(target.to_string(), box_str);
    }
    inputs
}
