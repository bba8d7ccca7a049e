use chrono::{DateTime, NaiveDateTime};
use ratatui::style::{Color, Modifier, Style};
use serde_json::{Map, Value};

use crate::protocol::{EventKind, LogEvent};

const EXPANDED_JSON_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub struct LineSpec {
    pub text: String,
    pub style: Style,
}

impl LineSpec {
    fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

// Maps one event to its display lines. Total over the LogEvent domain: any
// shape the feed produces comes back as lines or an explicit placeholder,
// never a panic. `expanded` switches collapsed summaries (tool arguments,
// large mappings) to their full serialized form.
pub fn event_lines(event: &LogEvent, expanded: bool) -> Vec<LineSpec> {
    let mut lines = match event.kind() {
        EventKind::ToolCalls => tool_call_lines(event, expanded),
        EventKind::TokenUsage => token_usage_lines(event),
        _ => generic_lines(event, expanded),
    };
    // Auxiliary metadata only surfaces on demand, and never resurrects an
    // event that rendered as nothing.
    if expanded && !lines.is_empty() {
        if let Some(metadata) = &event.metadata {
            lines.push(LineSpec::new(
                format!("  metadata: {}", compact_value(metadata)),
                placeholder_style(),
            ));
        }
    }
    lines
}

fn tool_call_lines(event: &LogEvent, expanded: bool) -> Vec<LineSpec> {
    let style = body_style(EventKind::ToolCalls);
    let calls = invocation_list(event);
    let mut lines = vec![header_line(event, &format!("tool calls ({})", calls.len()))];

    if calls.is_empty() {
        lines.push(LineSpec::new("  (no detailed info)", placeholder_style()));
        return lines;
    }

    for (index, call) in calls.iter().enumerate() {
        lines.push(LineSpec::new(
            format!("  #{} {}", index + 1, invocation_name(call)),
            style.add_modifier(Modifier::BOLD),
        ));
        if let Some(args) = invocation_args(call) {
            if expanded {
                for line in expanded_json(&args).lines() {
                    lines.push(LineSpec::new(format!("    {}", line), style));
                }
            } else {
                lines.push(LineSpec::new(
                    format!("    args: {}", arg_summary(&args)),
                    style,
                ));
            }
        }
    }
    lines
}

fn invocation_list(event: &LogEvent) -> Vec<Value> {
    if let Some(calls) = &event.tool_calls {
        return calls.clone();
    }
    if let Some(content) = &event.content {
        if let Some(calls) = content
            .get("tool_calls")
            .or_else(|| content.get("toolCalls"))
            .and_then(Value::as_array)
        {
            return calls.clone();
        }
        if let Some(calls) = content.as_array() {
            return calls.clone();
        }
    }
    Vec::new()
}

fn invocation_name(call: &Value) -> String {
    call.get("name")
        .and_then(Value::as_str)
        .or_else(|| {
            call.get("function")
                .and_then(|function| function.get("name"))
                .and_then(Value::as_str)
        })
        .or_else(|| call.get("tool_name").and_then(Value::as_str))
        .unwrap_or("unknown tool")
        .to_string()
}

// None means "no argument section": the invocation carried no arguments.
fn invocation_args(call: &Value) -> Option<Value> {
    let args = call
        .get("args")
        .or_else(|| {
            call.get("function")
                .and_then(|function| function.get("arguments"))
        })
        .or_else(|| call.get("arguments"))?;
    match args {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.clone()),
    }
}

fn arg_summary(args: &Value) -> String {
    match args {
        Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
        other => compact_value(other),
    }
}

fn token_usage_lines(event: &LogEvent) -> Vec<LineSpec> {
    // No resolvable usage mapping: deliberately render nothing at all.
    let Some(usage) = usage_mapping(event) else {
        return Vec::new();
    };

    let input = counter(&usage, "input_tokens")
        .or_else(|| counter(&usage, "prompt_tokens"))
        .unwrap_or(0);
    let output = counter(&usage, "output_tokens")
        .or_else(|| counter(&usage, "completion_tokens"))
        .unwrap_or(0);
    let total = counter(&usage, "total_tokens").unwrap_or(input + output);

    let mut text = format!("  input {}  output {}  total {}", input, output, total);
    for (key, label) in [
        ("cache_read_input_tokens", "cache read"),
        ("cache_creation_input_tokens", "cache write"),
    ] {
        if let Some(count) = counter(&usage, key) {
            if count != 0 {
                text.push_str(&format!("  {} {}", label, count));
            }
        }
    }

    vec![
        header_line(event, "usage"),
        LineSpec::new(text, body_style(EventKind::TokenUsage)),
    ]
}

fn usage_mapping(event: &LogEvent) -> Option<Map<String, Value>> {
    let content = event.content.as_ref()?;
    if let Some(usage) = content.get("usage").and_then(Value::as_object) {
        return Some(usage.clone());
    }
    content.as_object().cloned()
}

fn counter(usage: &Map<String, Value>, key: &str) -> Option<u64> {
    usage.get(key).and_then(Value::as_u64)
}

fn generic_lines(event: &LogEvent, expanded: bool) -> Vec<LineSpec> {
    let style = body_style(event.kind());
    let mut lines = vec![header_line(event, kind_label(event))];

    if let Some(message) = event.message.as_deref().filter(|m| !m.is_empty()) {
        push_text(&mut lines, message, style);
        return lines;
    }

    if let Some(content) = event.content.as_ref().filter(|c| !c.is_null()) {
        content_lines(content, expanded, style, &mut lines);
        return lines;
    }

    if let Some(results) = event.results.as_deref().filter(|r| !r.is_empty()) {
        if let [only] = results {
            lines.push(LineSpec::new(format!("  {}", compact_value(only)), style));
        } else {
            for (index, result) in results.iter().enumerate() {
                lines.push(LineSpec::new(
                    format!("  #{} {}", index + 1, compact_value(result)),
                    style,
                ));
            }
        }
        return lines;
    }

    lines.push(LineSpec::new("  (no content)", placeholder_style()));
    lines
}

fn content_lines(content: &Value, expanded: bool, style: Style, lines: &mut Vec<LineSpec>) {
    match content {
        Value::String(text) => push_text(lines, text, style),
        Value::Number(_) | Value::Bool(_) => {
            lines.push(LineSpec::new(format!("  {}", content), style));
        }
        Value::Null => lines.push(LineSpec::new("  (no content)", placeholder_style())),
        Value::Array(items) => match items.as_slice() {
            [] => lines.push(LineSpec::new("  (empty list)", placeholder_style())),
            [Value::String(only)] => push_text(lines, only, style),
            items => {
                for (index, item) in items.iter().enumerate() {
                    lines.push(LineSpec::new(
                        format!("  #{} {}", index + 1, compact_value(item)),
                        style,
                    ));
                }
            }
        },
        Value::Object(map) => {
            if let Some(text) = embedded_message(map) {
                push_text(lines, text, style);
            } else if map.len() <= 3 {
                for (key, value) in map {
                    lines.push(LineSpec::new(
                        format!("  {}: {}", key, compact_value(value)),
                        style,
                    ));
                }
            } else if expanded {
                lines.push(LineSpec::new(
                    format!("  {{{} keys}}", map.len()),
                    style.add_modifier(Modifier::BOLD),
                ));
                for line in expanded_json(&Value::Object(map.clone())).lines() {
                    lines.push(LineSpec::new(format!("  {}", line), style));
                }
            } else {
                lines.push(LineSpec::new(
                    format!("  {{{} keys}} (enter expands)", map.len()),
                    style,
                ));
            }
        }
    }
}

// Message-bearing keys tried in order; only string values count, anything
// else falls through to the structural renderings.
fn embedded_message(map: &Map<String, Value>) -> Option<&str> {
    for key in ["message", "text", "content", "output"] {
        if let Some(text) = map.get(key).and_then(Value::as_str) {
            return Some(text);
        }
    }
    None
}

// The bounded string form for values nested inside lists and mappings. Small
// mappings stay readable as key=value; anything larger collapses to a count
// so deeply structured payloads cannot blow up a single line.
pub fn compact_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) if map.len() <= 2 => map
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    key,
                    serde_json::to_string(value).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => format!("{{{} fields}}", map.len()),
    }
}

fn push_text(lines: &mut Vec<LineSpec>, text: &str, style: Style) {
    if text.is_empty() {
        lines.push(LineSpec::new("  (no content)", placeholder_style()));
        return;
    }
    for line in text.lines() {
        lines.push(LineSpec::new(format!("  {}", line), style));
    }
}

fn header_line(event: &LogEvent, label: &str) -> LineSpec {
    LineSpec::new(
        format!("{} {}", format_timestamp(event.timestamp.as_deref()), label),
        body_style(event.kind()).add_modifier(Modifier::BOLD),
    )
}

fn kind_label(event: &LogEvent) -> &str {
    match event.kind() {
        EventKind::ModelContent => "agent",
        EventKind::Thinking => "thinking",
        EventKind::ToolCalls => "tool calls",
        EventKind::ToolResults => "tool results",
        EventKind::TokenUsage => "usage",
        EventKind::ResponseMetadata => "metadata",
        EventKind::Status => "status",
        EventKind::Log => "log",
        EventKind::Message => "message",
        EventKind::Unknown => &event.kind,
    }
}

fn format_timestamp(timestamp: Option<&str>) -> String {
    let Some(raw) = timestamp else {
        return "--:--:--".to_string();
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format("%H:%M:%S").to_string();
    }
    // The feed emits naive UTC timestamps without an offset.
    raw.parse::<NaiveDateTime>()
        .map(|parsed| parsed.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.chars().take(8).collect())
}

fn expanded_json(value: &Value) -> String {
    truncate(
        &serde_json::to_string_pretty(value).unwrap_or_default(),
        EXPANDED_JSON_LIMIT,
        "...\n[truncated]",
    )
}

fn truncate(value: &str, max: usize, suffix: &str) -> String {
    if value.chars().count() > max {
        let head: String = value.chars().take(max).collect();
        format!("{}{}", head, suffix)
    } else {
        value.to_string()
    }
}

fn body_style(kind: EventKind) -> Style {
    let color = match kind {
        EventKind::ModelContent => Color::Yellow,
        EventKind::Thinking => Color::DarkGray,
        EventKind::ToolCalls => Color::Green,
        EventKind::ToolResults => Color::Cyan,
        EventKind::TokenUsage => Color::Magenta,
        EventKind::ResponseMetadata => Color::Blue,
        EventKind::Status => Color::Green,
        EventKind::Log => Color::Gray,
        EventKind::Message => Color::White,
        EventKind::Unknown => Color::Gray,
    };
    Style::default().fg(color)
}

fn placeholder_style() -> Style {
    Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::ITALIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, data: Value) -> LogEvent {
        LogEvent::from_wire(kind, data)
    }

    fn texts(lines: &[LineSpec]) -> Vec<String> {
        lines.iter().map(|line| line.text.clone()).collect()
    }

    fn body(lines: &[LineSpec]) -> Vec<String> {
        texts(lines)
            .into_iter()
            .skip(1)
            .map(|line| line.trim().to_string())
            .collect()
    }

    #[test]
    fn tool_call_group_is_titled_with_count_and_shows_arg_keys() {
        let event = event(
            "tool_calls",
            json!({"tool_calls": [{"name": "search", "args": {"q": "foo"}}]}),
        );
        let lines = event_lines(&event, false);
        assert!(lines[0].text.contains("tool calls (1)"));
        assert_eq!(body(&lines), vec!["#1 search", "args: q"]);
    }

    #[test]
    fn tool_call_args_expand_to_full_json() {
        let event = event(
            "tool_calls",
            json!({"tool_calls": [{"name": "search", "args": {"q": "foo"}}]}),
        );
        let lines = event_lines(&event, true);
        let joined = texts(&lines).join("\n");
        assert!(joined.contains("\"q\": \"foo\""));
    }

    #[test]
    fn empty_tool_call_list_renders_the_placeholder() {
        let event = event("tool_calls", json!({"tool_calls": []}));
        let lines = event_lines(&event, false);
        assert!(lines[0].text.contains("tool calls (0)"));
        assert_eq!(body(&lines), vec!["(no detailed info)"]);
    }

    #[test]
    fn tool_name_falls_back_through_the_alias_chain() {
        assert_eq!(
            invocation_name(&json!({"function": {"name": "grep"}})),
            "grep"
        );
        assert_eq!(invocation_name(&json!({"tool_name": "ls"})), "ls");
        assert_eq!(invocation_name(&json!({"id": "x"})), "unknown tool");
    }

    #[test]
    fn tool_args_fall_back_through_the_alias_chain() {
        assert_eq!(
            invocation_args(&json!({"function": {"arguments": {"a": 1}}})),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            invocation_args(&json!({"arguments": {"b": 2}})),
            Some(json!({"b": 2}))
        );
        assert_eq!(invocation_args(&json!({"args": {}})), None);
        assert_eq!(invocation_args(&json!({"name": "bare"})), None);
    }

    #[test]
    fn tool_calls_fall_back_to_content_list() {
        let event = event("tool_calls", json!({"content": [{"name": "search"}]}));
        let lines = event_lines(&event, false);
        assert!(lines[0].text.contains("tool calls (1)"));
        assert_eq!(body(&lines), vec!["#1 search"]);
    }

    #[test]
    fn token_usage_computes_the_missing_total() {
        let event = event(
            "token_usage",
            json!({"content": {"usage": {"input_tokens": 10, "output_tokens": 5}}}),
        );
        let lines = event_lines(&event, false);
        assert_eq!(body(&lines), vec!["input 10  output 5  total 15"]);
    }

    #[test]
    fn token_usage_accepts_legacy_key_names() {
        let event = event(
            "token_usage",
            json!({"prompt_tokens": 7, "completion_tokens": 3}),
        );
        let lines = event_lines(&event, false);
        assert_eq!(body(&lines), vec!["input 7  output 3  total 10"]);
    }

    #[test]
    fn token_usage_shows_cache_counters_only_when_nonzero() {
        let event = event(
            "token_usage",
            json!({"input_tokens": 1, "output_tokens": 1, "cache_read_input_tokens": 4, "cache_creation_input_tokens": 0}),
        );
        let lines = event_lines(&event, false);
        let line = &body(&lines)[0];
        assert!(line.contains("cache read 4"));
        assert!(!line.contains("cache write"));
    }

    #[test]
    fn token_usage_without_a_mapping_renders_nothing() {
        let event = event("token_usage", json!({}));
        assert!(event_lines(&event, false).is_empty());

        let event = LogEvent {
            kind: "token_usage".to_string(),
            content: Some(json!("oops")),
            ..LogEvent::default()
        };
        assert!(event_lines(&event, false).is_empty());
    }

    #[test]
    fn message_wins_over_content() {
        let event = LogEvent {
            kind: "log".to_string(),
            message: Some("the message".to_string()),
            content: Some(json!({"ignored": true})),
            ..LogEvent::default()
        };
        assert_eq!(body(&event_lines(&event, false)), vec!["the message"]);
    }

    #[test]
    fn string_content_renders_verbatim() {
        let event = event("ai_content", json!("hello world"));
        assert_eq!(body(&event_lines(&event, false)), vec!["hello world"]);
    }

    #[test]
    fn empty_list_content_renders_the_empty_marker() {
        let event = event("log", json!({"content": []}));
        assert_eq!(body(&event_lines(&event, false)), vec!["(empty list)"]);
    }

    #[test]
    fn single_string_list_renders_the_string() {
        let event = event("log", json!({"content": ["only line"]}));
        assert_eq!(body(&event_lines(&event, false)), vec!["only line"]);
    }

    #[test]
    fn longer_lists_render_indexed_compact_lines() {
        let event = event("log", json!({"content": ["a", {"x": 1, "y": 2, "z": 3}]}));
        assert_eq!(
            body(&event_lines(&event, false)),
            vec!["#1 a", "#2 {3 fields}"]
        );
    }

    #[test]
    fn mapping_content_prefers_message_bearing_keys() {
        let event = event("message", json!({"content": {"text": "inner", "code": 1}}));
        assert_eq!(body(&event_lines(&event, false)), vec!["inner"]);
    }

    #[test]
    fn small_mapping_renders_key_value_lines_and_large_collapses() {
        let three = event("message", json!({"content": {"a": 1, "b": 2, "c": 3}}));
        assert_eq!(
            body(&event_lines(&three, false)),
            vec!["a: 1", "b: 2", "c: 3"]
        );

        let four = event("message", json!({"content": {"a": 1, "b": 2, "c": 3, "d": 4}}));
        let lines = body(&event_lines(&four, false));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("{4 keys}"));
    }

    #[test]
    fn collapsed_mapping_expands_to_full_json() {
        let four = event("message", json!({"content": {"a": 1, "b": 2, "c": 3, "d": 4}}));
        let joined = body(&event_lines(&four, true)).join("\n");
        assert!(joined.contains("{4 keys}"));
        assert!(joined.contains("\"d\": 4"));
    }

    #[test]
    fn results_render_compact_forms() {
        let single = LogEvent {
            kind: "tools_execution".to_string(),
            results: Some(vec![json!({"name": "read", "ok": true})]),
            ..LogEvent::default()
        };
        assert_eq!(
            body(&event_lines(&single, false)),
            vec!["name=\"read\", ok=true"]
        );

        let multiple = LogEvent {
            kind: "tools_execution".to_string(),
            results: Some(vec![json!("first"), json!(["x", "y"])]),
            ..LogEvent::default()
        };
        assert_eq!(
            body(&event_lines(&multiple, false)),
            vec!["#1 first", "#2 [2 items]"]
        );
    }

    #[test]
    fn bare_event_renders_the_no_content_placeholder() {
        let event = LogEvent {
            kind: "status".to_string(),
            ..LogEvent::default()
        };
        assert_eq!(body(&event_lines(&event, false)), vec!["(no content)"]);
    }

    #[test]
    fn unknown_kinds_render_with_their_raw_name() {
        let event = event("totally_new", json!({"payload": "x"}));
        let lines = event_lines(&event, false);
        assert!(lines[0].text.contains("totally_new"));
        assert_eq!(body(&lines), vec!["payload: x"]);
    }

    #[test]
    fn compact_value_boundary_sits_at_two_keys() {
        assert_eq!(compact_value(&json!({"x": 1, "y": 2})), "x=1, y=2");
        assert_eq!(compact_value(&json!({"x": 1, "y": 2, "z": 3})), "{3 fields}");
    }

    #[test]
    fn compact_value_covers_primitives_and_empties() {
        assert_eq!(compact_value(&json!(null)), "null");
        assert_eq!(compact_value(&json!(true)), "true");
        assert_eq!(compact_value(&json!(3.5)), "3.5");
        assert_eq!(compact_value(&json!("text")), "text");
        assert_eq!(compact_value(&json!([])), "[]");
        assert_eq!(compact_value(&json!({})), "{}");
        assert_eq!(compact_value(&json!([1, 2, 3])), "[3 items]");
    }

    #[test]
    fn timestamps_format_to_clock_time() {
        assert_eq!(format_timestamp(Some("2026-08-06T10:20:30Z")), "10:20:30");
        assert_eq!(
            format_timestamp(Some("2026-08-06T10:20:30.123456")),
            "10:20:30"
        );
        assert_eq!(format_timestamp(None), "--:--:--");
        assert_eq!(format_timestamp(Some("raw-stamp-value")), "raw-stam");
    }

    #[test]
    fn metadata_appears_only_when_expanded() {
        let event = event(
            "response_metadata",
            json!({"message": "done", "metadata": {"model": "m-1"}}),
        );
        let collapsed = texts(&event_lines(&event, false)).join("\n");
        assert!(!collapsed.contains("metadata:"));

        let expanded = texts(&event_lines(&event, true)).join("\n");
        assert!(expanded.contains("metadata: model=\"m-1\""));
    }

    #[test]
    fn status_payload_renders_key_value_lines() {
        let event = event(
            "status",
            json!({"status": "failed", "error_message": "agent crashed"}),
        );
        let lines = body(&event_lines(&event, false));
        assert!(lines.contains(&"status: failed".to_string()));
        assert!(lines.contains(&"error_message: agent crashed".to_string()));
    }
}
