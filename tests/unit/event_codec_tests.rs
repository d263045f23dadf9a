//! Unit tests for `stream-json` line parsing and the tolerant event codec.

use agent_turnstile::agent::codec::{EventCodec, EventDecoder};
use agent_turnstile::agent::event::parse_line;
use agent_turnstile::agent::Event;
use agent_turnstile::AppError;
use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::Decoder;

const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s-1"}"#;
const TEXT: &str =
    r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#;
const RESULT: &str =
    r#"{"type":"result","subtype":"success","is_error":false,"result":"done","session_id":"s-1"}"#;

// ─── parse_line ──────────────────────────────────────────────────────

#[test]
fn system_line_becomes_init() {
    let events = parse_line(INIT).expect("parse");
    assert_eq!(
        events,
        vec![Event::Init {
            session_id: Some("s-1".into())
        }]
    );
}

#[test]
fn assistant_line_yields_one_event_per_block() {
    let line = r#"{"type":"assistant","message":{"content":[
        {"type":"text","text":"Let me look."},
        {"type":"thinking","thinking":"hmm"},
        {"type":"tool_use","id":"tu_1","name":"Read","input":{"file_path":"/src/main.rs"}}
    ]}}"#
        .replace('\n', " ");

    let events = parse_line(&line).expect("parse");
    assert_eq!(events.len(), 2, "unknown block kinds are dropped");
    assert_eq!(
        events[0],
        Event::Text {
            text: "Let me look.".into()
        }
    );
    assert_eq!(
        events[1],
        Event::ToolUse {
            id: Some("tu_1".into()),
            name: "Read".into(),
            input: json!({"file_path": "/src/main.rs"}),
        }
    );
}

#[test]
fn success_result_becomes_completion() {
    let events = parse_line(RESULT).expect("parse");
    assert_eq!(
        events,
        vec![Event::Completion {
            text: "done".into(),
            session_id: Some("s-1".into()),
        }]
    );
}

#[test]
fn error_flag_becomes_failure_with_result_text() {
    let line = r#"{"type":"result","subtype":"success","is_error":true,"result":"quota exceeded"}"#;
    let events = parse_line(line).expect("parse");
    assert_eq!(
        events,
        vec![Event::Failure {
            message: "quota exceeded".into()
        }]
    );
}

#[test]
fn error_subtype_without_result_uses_subtype() {
    let line = r#"{"type":"result","subtype":"error_max_turns"}"#;
    let events = parse_line(line).expect("parse");
    assert_eq!(
        events,
        vec![Event::Failure {
            message: "error_max_turns".into()
        }]
    );
}

#[test]
fn error_flag_without_detail_uses_generic_message() {
    let events = parse_line(r#"{"type":"result","is_error":true}"#).expect("parse");
    assert_eq!(
        events,
        vec![Event::Failure {
            message: "agent reported an error".into()
        }]
    );
}

#[test]
fn unknown_type_yields_nothing() {
    let events = parse_line(r#"{"type":"user","message":{}}"#).expect("parse");
    assert!(events.is_empty());
}

#[test]
fn blank_line_yields_nothing() {
    assert!(parse_line("   ").expect("parse").is_empty());
}

#[test]
fn non_json_line_is_stream_error() {
    let err = parse_line("Warning: something on stdout").expect_err("should fail");
    assert!(matches!(err, AppError::Stream(ref msg) if msg.starts_with("malformed json")));
}

// ─── EventCodec ──────────────────────────────────────────────────────

#[test]
fn codec_waits_for_newline() {
    let mut codec = EventCodec::new();
    let mut buf = BytesMut::from(&INIT.as_bytes()[..10]);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn codec_skips_noise_between_events() {
    let mut codec = EventCodec::new();
    let input = format!("{INIT}\nnot json at all\n\n{{\"type\":\"ping\"}}\n{RESULT}\n");
    let mut buf = BytesMut::from(input.as_str());

    let first = codec.decode(&mut buf).expect("decode").expect("event");
    assert!(matches!(first, Event::Init { .. }));
    let second = codec.decode(&mut buf).expect("decode").expect("event");
    assert!(matches!(second, Event::Completion { .. }));
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn codec_drains_multi_block_line_across_calls() {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}"#;
    let mut codec = EventCodec::new();
    let mut buf = BytesMut::from(format!("{line}\n").as_str());

    let a = codec.decode(&mut buf).expect("decode").expect("a");
    let b = codec.decode(&mut buf).expect("decode").expect("b");
    assert_eq!(a, Event::Text { text: "a".into() });
    assert_eq!(b, Event::Text { text: "b".into() });
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn codec_discards_overlong_line_and_recovers() {
    let mut codec = EventCodec::with_max_length(64);
    let long = format!("{{\"type\":\"assistant\",\"pad\":\"{}\"}}", "x".repeat(200));
    let input = format!("{long}\n{INIT}\n");
    let mut buf = BytesMut::from(input.as_str());

    let event = codec.decode(&mut buf).expect("decode").expect("event");
    assert!(matches!(event, Event::Init { .. }));
}

#[test]
fn codec_skips_invalid_utf8_line() {
    let mut codec = EventCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0xff, 0xfe, b'\n']);
    buf.extend_from_slice(INIT.as_bytes());
    buf.extend_from_slice(b"\n");

    let event = codec.decode(&mut buf).expect("decode").expect("event");
    assert!(matches!(event, Event::Init { .. }));
}

#[test]
fn decode_eof_flushes_unterminated_line() {
    let mut codec = EventCodec::new();
    let mut buf = BytesMut::from(RESULT);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    let event = codec.decode_eof(&mut buf).expect("decode").expect("event");
    assert!(matches!(event, Event::Completion { .. }));
}

// ─── EventDecoder ────────────────────────────────────────────────────

#[test]
fn chunking_does_not_change_decoded_events() {
    let input = format!("{INIT}\n{TEXT}\ngarbage\n{RESULT}");
    let bytes = input.as_bytes();

    let mut whole = EventDecoder::new();
    let mut expected = whole.feed(bytes);
    expected.extend(whole.finish());
    assert_eq!(expected.len(), 3);

    for chunk_size in [1, 2, 7, 33] {
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        assert_eq!(events, expected, "chunk size {chunk_size}");
    }
}

#[test]
fn multibyte_text_survives_any_split_point() {
    let input = concat!(
        "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"na\u{ef}ve \u{65e5}\u{672c}\"}]}}",
        "\n",
        "{\"type\":\"result\",\"result\":\"h\u{e9}llo \u{2713}\",\"session_id\":\"s-\u{e9}\"}\n",
    );
    let bytes = input.as_bytes();
    assert!(bytes.len() > input.chars().count(), "fixture must contain multibyte text");
    let expected = vec![
        Event::Text {
            text: "na\u{ef}ve \u{65e5}\u{672c}".into(),
        },
        Event::Completion {
            text: "h\u{e9}llo \u{2713}".into(),
            session_id: Some("s-\u{e9}".into()),
        },
    ];

    for split in 0..=bytes.len() {
        let mut decoder = EventDecoder::new();
        let mut events = decoder.feed(&bytes[..split]);
        events.extend(decoder.feed(&bytes[split..]));
        events.extend(decoder.finish());
        assert_eq!(events, expected, "split at byte {split}");
    }
}

#[test]
fn decoder_feed_returns_only_completed_lines() {
    let mut decoder = EventDecoder::new();
    assert!(decoder.feed(&INIT.as_bytes()[..5]).is_empty());
    let events = decoder.feed(&INIT.as_bytes()[5..]);
    assert!(events.is_empty(), "no newline yet");
    let events = decoder.feed(b"\n");
    assert_eq!(events.len(), 1);
}
