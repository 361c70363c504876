use exec_events::{ExecEvent, JsonLineDecoder, TurnUsage};
use serde_json::json;

#[test]
fn turn_completed_reads_usage_and_replayed_items() {
    let events = JsonLineDecoder::parse_lines(concat!(
        "{\"type\":\"turn.completed\",",
        "\"usage\":{\"input_tokens\":900,\"cached_input_tokens\":400,\"output_tokens\":33,\"reasoning_output_tokens\":12},",
        "\"items\":[{\"type\":\"agent_message\",\"text\":\"hi\"}]}\n"
    ));

    assert_eq!(
        events,
        vec![ExecEvent::TurnCompleted {
            usage: TurnUsage {
                input_tokens: 900,
                cached_input_tokens: 400,
                output_tokens: 33,
                reasoning_tokens: 12,
            },
            items: vec![json!({"type": "agent_message", "text": "hi"})],
        }]
    );
}

#[test]
fn missing_usage_decodes_as_zero_counters() {
    let events = JsonLineDecoder::parse_lines("{\"type\":\"turn.completed\"}\n");
    let Some(ExecEvent::TurnCompleted { usage, items }) = events.first() else {
        panic!("expected turn.completed");
    };

    assert!(usage.is_empty());
    assert!(items.is_empty());
}

#[test]
fn unknown_event_types_are_preserved_by_name() {
    let events = JsonLineDecoder::parse_lines("{\"type\":\"session.configured\",\"model\":\"x\"}\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), "session.configured");
}

#[test]
fn turn_failed_reads_nested_error_message() {
    let events = JsonLineDecoder::parse_lines(
        "{\"type\":\"turn.failed\",\"error\":{\"message\":\"context window exceeded\"}}\n",
    );
    assert_eq!(
        events,
        vec![ExecEvent::TurnFailed {
            message: Some("context window exceeded".to_string())
        }]
    );
}

#[test]
fn events_serialize_with_wire_type_tags() {
    let event = ExecEvent::ThreadStarted {
        thread_id: Some("s1".to_string()),
    };
    let json = serde_json::to_value(&event).expect("serialize event");
    assert_eq!(json["type"], "thread.started");
    assert_eq!(json["thread_id"], "s1");
}
