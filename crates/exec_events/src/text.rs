//! Field extraction helpers for duck-typed item payloads.
//!
//! Every extractor walks a fixed priority list of field names and returns the
//! first usable value. Blank strings count as absent.

use serde_json::Value;

const AGENT_TEXT_KEYS: &[&str] = &["text", "content", "output_text", "summary"];
const AGENT_PART_KEYS: &[&str] = &["text", "output_text", "content", "summary"];
const NESTED_OUTPUT_TEXT_KEYS: &[&str] = &["text", "content", "summary"];
const COMMAND_KEYS: &[&str] = &["command", "cmd", "command_line", "shell_command"];
const NESTED_COMMAND_KEYS: &[&str] = &["command", "command_line", "shell_command"];
const TOOL_NAME_KEYS: &[&str] = &["name", "tool", "tool_name", "function_name", "type"];
const RESULT_TEXT_KEYS: &[&str] = &[
    "content",
    "output",
    "aggregated_output",
    "result",
    "text",
    "summary",
];
const RESULT_PART_KEYS: &[&str] = &["text", "output_text", "content"];
const ERROR_STATUSES: &[&str] = &["failed", "error", "declined"];

pub const DEFAULT_TOOL_NAME: &str = "Tool";

/// Returns the string when it carries non-whitespace content.
pub fn value_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.trim().is_empty())
}

/// First non-blank string among `keys`.
pub fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(value_str)
        .map(ToString::to_string)
}

/// First non-null identifier among `keys`; numeric ids are stringified.
pub fn first_id(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

/// True when `key` is present and not JSON `null`.
pub fn has_value(value: &Value, key: &str) -> bool {
    value.get(key).is_some_and(|field| !field.is_null())
}

/// Assistant text: plain fields, then a parts array, then a nested `output` object.
pub fn agent_message_text(item: &Value) -> String {
    if let Some(text) = first_string(item, AGENT_TEXT_KEYS) {
        return text;
    }

    for key in ["content", "output"] {
        if let Some(parts) = item.get(key).and_then(Value::as_array) {
            let joined = join_parts(parts, AGENT_PART_KEYS, "");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    item.get("output")
        .filter(|output| output.is_object())
        .and_then(|output| first_string(output, NESTED_OUTPUT_TEXT_KEYS))
        .unwrap_or_default()
}

/// Reasoning text, including `summary` part arrays.
pub fn reasoning_text(item: &Value) -> String {
    if let Some(text) = first_string(item, &["text", "summary", "content"]) {
        return text;
    }

    ["summary", "content"]
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_array))
        .map(|parts| join_parts(parts, &["text", "summary"], "\n"))
        .find(|joined| !joined.is_empty())
        .unwrap_or_default()
}

/// Display name of a tool item, defaulting to [`DEFAULT_TOOL_NAME`].
pub fn tool_name(item: &Value) -> String {
    first_string(item, TOOL_NAME_KEYS).unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string())
}

/// Shell-ish command text carried by a tool item, if any.
pub fn command_text(item: &Value) -> Option<String> {
    direct_command(item)
        .or_else(|| {
            item.get("execution")
                .and_then(|execution| first_command(execution, NESTED_COMMAND_KEYS))
        })
        .or_else(|| {
            ["input", "arguments"]
                .iter()
                .filter_map(|key| item.get(*key))
                .map(decode_embedded_json)
                .find_map(|input| direct_command(&input))
        })
}

/// Tool output text, walking the known result shapes in priority order.
pub fn result_text(item: &Value) -> String {
    if let Some(text) = first_string(item, RESULT_TEXT_KEYS) {
        return text;
    }

    if let Some(streams) = joined_streams(item) {
        return streams;
    }

    for key in ["output", "content"] {
        if let Some(parts) = item.get(key).and_then(Value::as_array) {
            let joined = join_parts(parts, RESULT_PART_KEYS, "\n");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    if let Some(output) = item.get("output").filter(|output| output.is_object()) {
        if let Some(streams) = joined_streams(output) {
            return streams;
        }
        if let Some(text) = first_string(output, &["text", "summary", "content"]) {
            return text;
        }
    }

    if let Some(summary) = item.get("execution").and_then(execution_summary) {
        return summary;
    }

    match item.get("result") {
        Some(result @ Value::Object(_)) => result
            .get("content")
            .and_then(Value::as_array)
            .map(|parts| join_parts(parts, RESULT_PART_KEYS, "\n"))
            .filter(|joined| !joined.is_empty())
            .unwrap_or_else(|| result.to_string()),
        _ => String::new(),
    }
}

/// Whether a tool result item signals failure.
pub fn result_is_error(item: &Value) -> bool {
    if item.get("is_error").and_then(Value::as_bool) == Some(true) {
        return true;
    }

    let has_error = match item.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    };
    if has_error {
        return true;
    }

    let failed_status = item
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| ERROR_STATUSES.contains(&status));
    if failed_status {
        return true;
    }

    [Some(item), item.get("execution")]
        .into_iter()
        .flatten()
        .filter_map(|value| value.get("exit_code").and_then(Value::as_i64))
        .any(|code| code != 0)
}

fn direct_command(value: &Value) -> Option<String> {
    first_command(value, COMMAND_KEYS).or_else(|| {
        value
            .get("argv")
            .and_then(Value::as_array)
            .map(|argv| join_argv(argv))
            .filter(|joined| !joined.is_empty())
    })
}

fn first_command(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            Value::Array(argv) => Some(join_argv(argv)).filter(|joined| !joined.is_empty()),
            _ => None,
        })
}

fn join_argv(argv: &[Value]) -> String {
    argv.iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_embedded_json(value: &Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn joined_streams(value: &Value) -> Option<String> {
    let streams: Vec<&str> = ["stdout", "stderr"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(value_str))
        .collect();

    if streams.is_empty() {
        None
    } else {
        Some(streams.join("\n"))
    }
}

fn join_parts(parts: &[Value], keys: &[&str], separator: &str) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Object(_) => first_string(part, keys),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn execution_summary(execution: &Value) -> Option<String> {
    let command = first_command(execution, NESTED_COMMAND_KEYS);
    let exit_code = ["exit_code", "exitCode"]
        .iter()
        .find_map(|key| execution.get(*key).and_then(Value::as_i64));
    let duration_ms = ["duration_ms", "duration"]
        .iter()
        .find_map(|key| execution.get(*key).and_then(Value::as_f64));

    if command.is_none() && exit_code.is_none() && duration_ms.is_none() {
        return None;
    }

    let mut line = match command {
        Some(command) => format!("`{command}`"),
        None => "command".to_string(),
    };
    match exit_code {
        Some(code) => line.push_str(&format!(" exited with code {code}")),
        None => line.push_str(" finished"),
    }
    if let Some(duration_ms) = duration_ms {
        line.push_str(&format!(" after {}ms", duration_ms.round() as u64));
    }

    Some(line)
}
