//! Codec benchmarks.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rsio::engineio;
use rsio::protocol::assembler::MessageAssembler;
use rsio::protocol::frame::Frame;
use rsio::protocol::handshake::{HandshakeRequest, compute_accept_key};
use rsio::socketio::{self, DEFAULT_NAMESPACE};
use rsio::Config;
use serde_json::json;

fn encode(frame: &Frame, mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame.wire_size(mask.is_some()));
    frame.write(&mut buf, mask);
    buf
}

fn bench_frame_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parsing");
    let mask = [0x37, 0xfa, 0x21, 0x3d];

    for size in [10usize, 1024, 64 * 1024] {
        let frame = Frame::binary(vec![0xAB; size]);
        let unmasked = encode(&frame, None);
        let masked = encode(&frame, Some(mask));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("unmasked", size), &unmasked, |b, buf| {
            b.iter(|| Frame::parse(black_box(buf)))
        });
        group.bench_with_input(BenchmarkId::new("masked", size), &masked, |b, buf| {
            b.iter(|| Frame::parse(black_box(buf)))
        });
    }
    group.finish();
}

fn bench_frame_writing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_writing");
    for size in [10usize, 1024, 64 * 1024] {
        let frame = Frame::binary(vec![0xCD; size]);
        let mut buf = Vec::with_capacity(frame.wire_size(true));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("masked", size), &frame, |b, frame| {
            b.iter(|| {
                buf.clear();
                frame.write(&mut buf, Some([1, 2, 3, 4]));
            })
        });
    }
    group.finish();
}

fn bench_fragmented_message(c: &mut Criterion) {
    let config = Config::server();
    let chunk = Frame::new(false, rsio::OpCode::Text, b"x".repeat(1024));
    let last = Frame::new(true, rsio::OpCode::Continuation, b"x".repeat(1024));
    let middle = Frame::new(false, rsio::OpCode::Continuation, b"x".repeat(1024));

    c.bench_function("assemble_8_fragments", |b| {
        b.iter(|| {
            let mut assembler = MessageAssembler::new(config.limits.clone());
            let _ = assembler.push(black_box(chunk.clone()));
            for _ in 0..6 {
                let _ = assembler.push(black_box(middle.clone()));
            }
            assembler.push(black_box(last.clone()))
        })
    });
}

fn bench_handshake(c: &mut Criterion) {
    let request = b"GET /socket.io/?EIO=4&transport=websocket HTTP/1.1\r\n\
        Host: 127.0.0.1:9096\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    c.bench_function("handshake_parse", |b| {
        b.iter(|| HandshakeRequest::parse(black_box(request)))
    });
    c.bench_function("accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")))
    });
}

fn bench_packets(c: &mut Criterion) {
    let mut group = c.benchmark_group("packets");

    let event = socketio::Packet::event(
        DEFAULT_NAMESPACE,
        "message_response",
        vec![json!("lobby"), json!("hello"), json!({ "n": 1, "tags": ["a", "b"] })],
    );
    let wire = engineio::Packet::message(event.encode()).encode();

    group.bench_function("socketio_encode_event", |b| {
        b.iter(|| engineio::Packet::message(black_box(&event).encode()).encode())
    });
    group.bench_function("socketio_decode_event", |b| {
        b.iter(|| {
            let engine = engineio::Packet::decode(black_box(&wire)).unwrap();
            socketio::Packet::decode(&engine.data)
        })
    });
    group.bench_function("socketio_decode_ack", |b| {
        b.iter(|| socketio::Packet::decode(black_box(r#"12["1.2.3","stable"]"#)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_frame_parsing,
    bench_frame_writing,
    bench_fragmented_message,
    bench_handshake,
    bench_packets,
);
criterion_main!(benches);
