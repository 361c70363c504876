use serde::Serialize;
use serde_json::Value;

use crate::text::{first_string, value_str};

/// Token counters reported by a `turn.completed` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TurnUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
}

impl TurnUsage {
    /// Reads usage counters, accepting the field aliases emitted by different agent versions.
    pub fn from_value(usage: Option<&Value>) -> Self {
        let Some(usage) = usage else {
            return Self::default();
        };

        Self {
            input_tokens: counter(usage, &["input_tokens"]),
            cached_input_tokens: counter(usage, &["cached_input_tokens", "cache_read_input_tokens"]),
            output_tokens: counter(usage, &["output_tokens"]),
            reasoning_tokens: counter(usage, &["reasoning_output_tokens", "reasoning_tokens"]),
        }
    }

    /// Input tokens minus cache hits, never negative.
    pub fn net_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_input_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.net_input_tokens() == 0 && self.output_tokens == 0
    }
}

/// One decoded line of the agent's JSONL output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExecEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: Option<String> },
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "item.started")]
    ItemStarted { item: Value },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: Value },
    #[serde(rename = "turn.completed")]
    TurnCompleted { usage: TurnUsage, items: Vec<Value> },
    /// `turn.failed` and top-level `error` events, normalized.
    #[serde(rename = "turn.failed")]
    TurnFailed { message: Option<String> },
    /// Event type this crate does not interpret; retained for logging.
    #[serde(rename = "unknown")]
    Unknown { event_type: String },
}

impl ExecEvent {
    /// Maps a parsed JSON object to an event. Returns `None` when `type` is missing.
    pub fn from_value(value: Value) -> Option<Self> {
        let event_type = value.get("type")?.as_str()?.to_string();

        let event = match event_type.as_str() {
            "thread.started" => Self::ThreadStarted {
                thread_id: first_string(&value, &["thread_id", "session_id"]),
            },
            "turn.started" => Self::TurnStarted,
            "item.started" => Self::ItemStarted {
                item: value.get("item").cloned().unwrap_or(Value::Null),
            },
            "item.completed" => Self::ItemCompleted {
                item: value.get("item").cloned().unwrap_or(Value::Null),
            },
            "turn.completed" => Self::TurnCompleted {
                usage: TurnUsage::from_value(value.get("usage")),
                items: ["items", "output"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(Value::as_array))
                    .cloned()
                    .unwrap_or_default(),
            },
            "turn.failed" | "error" => Self::TurnFailed {
                message: value
                    .get("error")
                    .and_then(|error| {
                        value_str(error)
                            .map(ToString::to_string)
                            .or_else(|| first_string(error, &["message"]))
                    })
                    .or_else(|| first_string(&value, &["message"])),
            },
            _ => Self::Unknown { event_type },
        };

        Some(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::ThreadStarted { .. } => "thread.started",
            Self::TurnStarted => "turn.started",
            Self::ItemStarted { .. } => "item.started",
            Self::ItemCompleted { .. } => "item.completed",
            Self::TurnCompleted { .. } => "turn.completed",
            Self::TurnFailed { .. } => "turn.failed",
            Self::Unknown { event_type } => event_type,
        }
    }
}

fn counter(value: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|field| !field.is_null())
        .and_then(|field| match field {
            Value::Number(number) => number
                .as_u64()
                .or_else(|| number.as_i64().map(|signed| signed.max(0) as u64))
                .or_else(|| number.as_f64().map(|float| float.max(0.0) as u64)),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExecEvent, TurnUsage};

    #[test]
    fn usage_prefers_first_known_alias() {
        let usage = TurnUsage::from_value(Some(&json!({
            "input_tokens": 120,
            "cache_read_input_tokens": 20,
            "output_tokens": 7,
            "reasoning_tokens": 3
        })));

        assert_eq!(usage.cached_input_tokens, 20);
        assert_eq!(usage.reasoning_tokens, 3);
        assert_eq!(usage.net_input_tokens(), 100);
    }

    #[test]
    fn net_input_never_goes_negative() {
        let usage = TurnUsage::from_value(Some(&json!({
            "input_tokens": 5,
            "cached_input_tokens": 50
        })));

        assert_eq!(usage.net_input_tokens(), 0);
        assert!(usage.is_empty());
    }

    #[test]
    fn error_event_is_normalized_to_turn_failed() {
        let event = ExecEvent::from_value(json!({"type": "error", "message": "stream dropped"}))
            .expect("typed object should decode");

        assert_eq!(
            event,
            ExecEvent::TurnFailed {
                message: Some("stream dropped".to_string())
            }
        );
    }

    #[test]
    fn untyped_objects_are_not_events() {
        assert!(ExecEvent::from_value(json!({"item": {}})).is_none());
        assert!(ExecEvent::from_value(json!(42)).is_none());
    }
}
