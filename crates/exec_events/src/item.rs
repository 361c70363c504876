use serde_json::Value;

use crate::text::{
    agent_message_text, command_text, first_id, has_value, reasoning_text, result_is_error,
    result_text, tool_name,
};

/// Item `type` tags that always denote a tool result.
pub const TOOL_RESULT_TYPES: &[&str] = &[
    "tool_result",
    "function_call_output",
    "tool_call_output",
    "custom_tool_call_output",
    "local_shell_call_output",
    "mcp_tool_call_output",
];

/// Item `type` tags that always denote a tool invocation.
pub const TOOL_START_TYPES: &[&str] = &[
    "tool_use",
    "tool_call",
    "function_call",
    "custom_tool_call",
    "local_shell_call",
    "command_execution",
    "mcp_tool_call",
    "web_search",
];

const AGENT_MESSAGE_TYPES: &[&str] = &["agent_message", "assistant_message", "message"];
const START_ID_KEYS: &[&str] = &["id", "tool_use_id", "call_id", "invocation_id"];
const RESULT_ID_KEYS: &[&str] = &["tool_use_id", "call_id", "invocation_id", "id"];
const CORRELATION_ID_KEYS: &[&str] = &["tool_use_id", "call_id", "invocation_id"];
const OUTPUT_MARKER_KEYS: &[&str] = &["stdout", "stderr", "aggregated_output", "exit_code"];
const TOOL_IDENTITY_KEYS: &[&str] = &["name", "tool", "tool_name", "function_name"];
const COMMAND_MARKER_KEYS: &[&str] = &["command", "cmd", "command_line", "shell_command", "argv"];

/// A tool invocation announced by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStart {
    pub id: Option<String>,
    pub name: String,
    pub command: Option<String>,
}

/// Output of a previously announced (or unannounced) tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub id: Option<String>,
    pub command: Option<String>,
    pub output: String,
    pub is_error: bool,
}

/// Normalized item payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Reasoning { id: Option<String>, text: String },
    AgentMessage { id: Option<String>, text: String },
    ToolStart(ToolStart),
    ToolResult(ToolResult),
    Other { item_type: Option<String> },
}

impl Item {
    /// Classifies a raw item. Rules are checked in order and the first match wins:
    /// reasoning, assistant message, tool result, tool start.
    pub fn classify(item: &Value) -> Self {
        let item_type = item.get("type").and_then(Value::as_str);

        if item_type == Some("reasoning") {
            return Self::Reasoning {
                id: first_id(item, &["id"]),
                text: reasoning_text(item),
            };
        }

        if item_type.is_some_and(|kind| is_agent_message(kind, item)) {
            return Self::AgentMessage {
                id: first_id(item, &["id"]),
                text: agent_message_text(item),
            };
        }

        if is_tool_result(item_type, item) {
            return Self::ToolResult(ToolResult {
                id: first_id(item, RESULT_ID_KEYS),
                command: command_text(item),
                output: result_text(item),
                is_error: result_is_error(item),
            });
        }

        if is_tool_start(item_type, item) {
            return Self::ToolStart(ToolStart {
                // Results answer with the correlation field, so starts that carry one pair by it.
                id: first_id(item, CORRELATION_ID_KEYS).or_else(|| first_id(item, START_ID_KEYS)),
                name: tool_name(item),
                command: command_text(item),
            });
        }

        Self::Other {
            item_type: item_type.map(ToString::to_string),
        }
    }
}

fn is_agent_message(kind: &str, item: &Value) -> bool {
    if !AGENT_MESSAGE_TYPES.contains(&kind) {
        return false;
    }

    // Responses-style `message` items also carry user/system input.
    item.get("role")
        .and_then(Value::as_str)
        .map_or(true, |role| role == "assistant")
}

fn is_tool_result(kind: Option<&str>, item: &Value) -> bool {
    if kind.is_some_and(|kind| TOOL_RESULT_TYPES.contains(&kind)) {
        return true;
    }

    let in_progress = item.get("status").and_then(Value::as_str) == Some("in_progress");
    if in_progress {
        return false;
    }

    let explicit_start = kind.is_some_and(|kind| TOOL_START_TYPES.contains(&kind));
    if !explicit_start && CORRELATION_ID_KEYS.iter().any(|key| has_value(item, key)) {
        return true;
    }

    OUTPUT_MARKER_KEYS.iter().any(|key| has_value(item, key))
}

fn is_tool_start(kind: Option<&str>, item: &Value) -> bool {
    if kind.is_some_and(|kind| TOOL_START_TYPES.contains(&kind)) {
        return true;
    }

    TOOL_IDENTITY_KEYS.iter().any(|key| has_value(item, key))
        || ["input", "arguments"]
            .iter()
            .any(|key| item.get(*key).is_some_and(Value::is_object))
        || COMMAND_MARKER_KEYS.iter().any(|key| has_value(item, key))
}
