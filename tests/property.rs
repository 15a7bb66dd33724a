//! Property-based tests for the wire parsers.
//!
//! Every parser must reject garbage without panicking and accept what its
//! own encoder writes.

use proptest::prelude::*;
use rsio::engineio;
use rsio::http::RequestHead;
use rsio::protocol::{Frame, HandshakeRequest, OpCode};
use rsio::socketio::{self, DEFAULT_NAMESPACE, PacketKind};
use serde_json::{Value, json};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn json_arg_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,20}".prop_map(Value::from),
        prop::collection::vec("[a-z]{0,5}", 0..4).prop_map(|v| json!(v)),
    ]
}

proptest! {
    #[test]
    fn test_frame_parse_accepts_written(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..70000),
        mask in prop::option::of(any::<[u8; 4]>())
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mut buf = Vec::new();
        frame.write(&mut buf, mask);
        prop_assert_eq!(buf.len(), frame.wire_size(mask.is_some()));

        let (parsed, consumed) = Frame::parse(&buf).unwrap();
        prop_assert_eq!(consumed, buf.len());
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn test_frame_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..300)) {
        let _ = Frame::parse(&data);
    }

    #[test]
    fn test_truncated_frame_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..500),
        truncate_by in 1..50usize
    ) {
        let frame = Frame::new(true, OpCode::Binary, payload);
        let mut buf = Vec::new();
        frame.write(&mut buf, None);
        let truncated = buf.len().saturating_sub(truncate_by).max(1);
        if truncated < buf.len() {
            prop_assert!(Frame::parse(&buf[..truncated]).is_err());
        }
    }

    #[test]
    fn test_sequential_frames(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..100), 1..5)
    ) {
        let mut buf = Vec::new();
        for p in &payloads {
            Frame::new(true, OpCode::Binary, p.clone()).write(&mut buf, None);
        }

        let mut offset = 0;
        for p in &payloads {
            let (parsed, consumed) = Frame::parse(&buf[offset..]).unwrap();
            prop_assert_eq!(parsed.payload(), p.as_slice());
            offset += consumed;
        }
        prop_assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_handshake_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeRequest::parse(&data);
        let _ = RequestHead::parse(&data);
    }

    #[test]
    fn test_handshake_valid_variations(
        path in "/[a-z]{1,20}",
        host in "[a-z]{3,10}\\.[a-z]{2,4}"
    ) {
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        let parsed = HandshakeRequest::parse(request.as_bytes());
        prop_assert!(parsed.is_ok(), "valid request should parse: {:?}", parsed);
        prop_assert_eq!(parsed.unwrap().path, path);
    }

    #[test]
    fn test_engine_packet_decode_never_panics(text in "\\PC{0,40}") {
        let _ = engineio::Packet::decode(&text);
    }

    #[test]
    fn test_socketio_decode_never_panics(text in "[0-9/,\\[\\]{}\"a-z]{0,40}") {
        let _ = socketio::Packet::decode(&text);
    }

    #[test]
    fn test_socketio_event_decodes_what_it_encodes(
        event in "[a-z_]{1,16}",
        args in prop::collection::vec(json_arg_strategy(), 0..4),
        ack_id in prop::option::of(0u64..1_000_000)
    ) {
        let mut packet = socketio::Packet::event(DEFAULT_NAMESPACE, &event, args.clone());
        if let Some(id) = ack_id {
            packet = packet.with_ack_id(id);
        }
        let decoded = socketio::Packet::decode(&packet.encode()).unwrap();
        prop_assert_eq!(decoded.kind, PacketKind::Event);
        prop_assert_eq!(decoded.ack_id, ack_id);
        prop_assert_eq!(decoded.into_event().unwrap(), (event, args));
    }
}
