use exec_events::{ExecEvent, JsonLineDecoder};
use pretty_assertions::assert_eq;
use serde_json::json;

const STREAM: &str = concat!(
    "{\"type\":\"thread.started\",\"thread_id\":\"s1\"}\n",
    "{\"type\":\"turn.started\"}\n",
    "{\"type\":\"item.started\",\"item\":{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Bash\",\"input\":{\"command\":\"ls\"}}}\n",
    "{\"type\":\"item.completed\",\"item\":{\"type\":\"tool_result\",\"tool_use_id\":\"t1\",\"output\":\"a.txt\\nb.txt\"}}\n",
    "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"Two files \u{2014} done.\"}}\n",
    "{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":50,\"output_tokens\":10}}\n",
);

fn decode_in_chunks(bytes: &[u8], boundaries: &[usize]) -> Vec<ExecEvent> {
    let mut decoder = JsonLineDecoder::default();
    let mut events = Vec::new();
    let mut start = 0;

    for &end in boundaries {
        events.extend(decoder.feed(&bytes[start..end]));
        start = end;
    }
    events.extend(decoder.feed(&bytes[start..]));
    events.extend(decoder.finish());
    events
}

#[test]
fn decoded_sequence_is_independent_of_single_split_point() {
    let bytes = STREAM.as_bytes();
    let expected = JsonLineDecoder::parse_lines(STREAM);
    assert_eq!(expected.len(), 6);

    for split in 0..=bytes.len() {
        assert_eq!(decode_in_chunks(bytes, &[split]), expected, "split at {split}");
    }
}

#[test]
fn decoded_sequence_is_independent_of_chunk_size() {
    let bytes = STREAM.as_bytes();
    let expected = JsonLineDecoder::parse_lines(STREAM);

    for size in [1usize, 2, 3, 7, 16, 64] {
        let boundaries: Vec<usize> = (size..bytes.len()).step_by(size).collect();
        assert_eq!(decode_in_chunks(bytes, &boundaries), expected, "chunk size {size}");
    }
}

#[test]
fn malformed_and_blank_lines_are_dropped() {
    let payload = concat!(
        "not json at all\n",
        "\n",
        "{\"type\":\"turn.started\"\n",
        "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"ok\"}}\n",
        "[1,2,3]\n",
    );

    let events = JsonLineDecoder::parse_lines(payload);
    assert_eq!(
        events,
        vec![ExecEvent::ItemCompleted {
            item: json!({"type": "agent_message", "text": "ok"})
        }]
    );
}

#[test]
fn finish_parses_unterminated_trailing_line_once() {
    let mut decoder = JsonLineDecoder::default();
    assert!(decoder
        .feed(b"{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":1}}")
        .is_empty());

    let last = decoder.finish();
    assert!(matches!(last, Some(ExecEvent::TurnCompleted { .. })));
    assert!(decoder.finish().is_none());
    assert!(decoder.is_empty_buffer());
}

#[test]
fn finish_discards_truncated_json() {
    let mut decoder = JsonLineDecoder::default();
    assert!(decoder.feed(b"{\"type\":\"item.comp").is_empty());
    assert!(decoder.finish().is_none());
}
