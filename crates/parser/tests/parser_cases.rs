//! Reply-format cases and robustness checks for the action parser.

use proptest::prelude::*;
use screen_pilot_parser::*;

fn parse(prediction: &str) -> Vec<ParsedAction> {
    parse_prediction(&ParseOptions::new(prediction, 1000.0)).parsed
}

#[test]
fn test_point_click_is_normalized() {
    let parsed = parse("Thought: Click the box\nAction: click(start_box='(72,646)')");
    assert_eq!(parsed.len(), 1);
    let action = &parsed[0];
    assert_eq!(action.action_type, "click");
    assert_eq!(
        action.action_inputs.get("start_box").map(String::as_str),
        Some("[0.072,0.646,0.072,0.646]")
    );
    assert_eq!(action.thought.as_deref(), Some("Click the box"));
    assert_eq!(action.reflection, None);
}

#[test]
fn test_box_form_is_normalized() {
    let parsed = parse("Thought: drag it\nAction: drag(start_box='[100,200,300,400]', end_box='[500,500,500,500]')");
    let action = &parsed[0];
    assert_eq!(action.kind(), ActionKind::Drag);
    assert_eq!(action.input("start_box"), Some("[0.1,0.2,0.3,0.4]"));
    assert_eq!(action.input("end_box"), Some("[0.5,0.5,0.5,0.5]"));
}

#[test]
fn test_box_tokens_are_tolerated() {
    let parsed = parse("Action: click(start_box='<|box_start|>(500,250)<|box_end|>')");
    assert_eq!(parsed[0].input("start_box"), Some("[0.5,0.25,0.5,0.25]"));
    assert_eq!(parsed[0].thought, None);
}

#[test]
fn test_per_axis_factor() {
    let options = ParseOptions::new("Action: click(start_box='(683,384)')", [1366.0, 768.0]);
    let parsed = parse_prediction(&options).parsed;
    assert_eq!(parsed[0].input("start_box"), Some("[0.5,0.5,0.5,0.5]"));
}

#[test]
fn test_out_of_range_is_clamped() {
    let parsed = parse("Action: click(start_box='(1500,-20)')");
    assert_eq!(parsed[0].input("start_box"), Some("[1,0,1,0]"));
}

#[test]
fn test_finished_without_inputs() {
    let parsed = parse("Thought: finished.\nAction: finished()");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].action_type, "finished");
    assert!(parsed[0].action_inputs.is_empty());
    assert_eq!(parsed[0].thought.as_deref(), Some("finished."));
}

#[test]
fn test_type_keeps_escaped_newline() {
    let parsed = parse("Thought: search\nAction: type(content='rust lang\\n')");
    let content = parsed[0].input("content").unwrap();
    assert_eq!(content, "rust lang\\n");
    assert_eq!(split_submit(content), ("rust lang".to_string(), true));
}

#[test]
fn test_hotkey_and_scroll_inputs() {
    let parsed = parse("Action: hotkey(key='ctrl c')");
    assert_eq!(parsed[0].input("key"), Some("ctrl c"));

    let parsed = parse("Action: scroll(start_box='(10,10)', direction='down')");
    assert_eq!(parsed[0].input("direction"), Some("down"));
    assert_eq!(parsed[0].input("start_box"), Some("[0.01,0.01,0.01,0.01]"));
}

#[test]
fn test_navigate_url() {
    let parsed = parse("Thought: open docs\nAction: navigate(url='https://docs.rs')");
    assert_eq!(parsed[0].kind(), ActionKind::Navigate);
    assert_eq!(parsed[0].input("url"), Some("https://docs.rs"));
}

#[test]
fn test_reflection_is_captured() {
    let parsed = parse(
        "Reflection: the menu is closed\nAction_Summary: open the menu\nAction: click(start_box='(1,1)')",
    );
    assert_eq!(parsed[0].reflection.as_deref(), Some("the menu is closed"));
    assert_eq!(parsed[0].thought.as_deref(), Some("open the menu"));
}

#[test]
fn test_unknown_action_passes_through() {
    let parsed = parse("Action: teleport(target='moon')");
    assert_eq!(parsed[0].action_type, "teleport");
    assert_eq!(parsed[0].kind(), ActionKind::Unknown);
    assert_eq!(parsed[0].input("target"), Some("moon"));
}

#[test]
fn test_missing_action_line_yields_nothing() {
    assert!(parse("Thought: I am thinking but not acting").is_empty());
    assert!(parse("").is_empty());
}

#[test]
fn test_multiple_actions() {
    let parsed = parse(
        "Thought: fill the form\nAction: click(start_box='(10,10)')\n\nAction: type(content='hi')",
    );
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].action_type, "click");
    assert_eq!(parsed[1].action_type, "type");
    assert_eq!(parsed[1].thought.as_deref(), Some("fill the form"));
}

#[test]
fn test_screen_context_adds_pixel_coords() {
    let options = ParseOptions::new("Action: click(start_box='(500,500)')", 1000.0)
        .with_screen(1920.0, 1080.0, 2.0);
    let parsed = parse_prediction(&options).parsed;
    assert_eq!(parsed[0].input("start_coords"), Some("[1920,1080]"));
}

#[test]
fn test_serialized_shape() {
    let parsed = parse("Thought: Click the box\nAction: click(start_box='(72,646)')");
    let value = serde_json::to_value(&parsed[0]).unwrap();
    assert_eq!(value["action_type"], "click");
    assert_eq!(value["action_inputs"]["start_box"], "[0.072,0.646,0.072,0.646]");
    assert_eq!(value["thought"], "Click the box");
    assert!(value["reflection"].is_null());
}

proptest! {
    #[test]
    fn test_parser_never_panics(text in any::<String>()) {
        let _ = parse(&text);
        let _ = get_summary(&text);
    }

    #[test]
    fn test_boxes_stay_normalized(x in -5000i32..5000, y in -5000i32..5000) {
        let parsed = parse(&format!("Action: click(start_box='({},{})')", x, y));
        let normalized = NormalizedBox::parse(parsed[0].input("start_box").unwrap()).unwrap();
        for value in [normalized.x1, normalized.y1, normalized.x2, normalized.y2] {
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
