//! Codec benchmarks for wsprobe.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsprobe::config::{Limits, Target};
use wsprobe::protocol::handshake::compute_accept_key;
use wsprobe::protocol::mask::apply_mask;
use wsprobe::protocol::{Frame, OpCode, RawHttpResponse, encode_masked, upgrade_request};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

// =============================================================================
// Frame Encoding and Parsing
// =============================================================================

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");

    for (label, size) in [("inline_10b", 10usize), ("ext16_1kb", 1024), ("ext64_64kb", 65_536)] {
        let payload = vec![0xAB; size];
        let wire = encode_masked(OpCode::Text, &payload, MASK);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{label}"), |b| {
            b.iter(|| encode_masked(OpCode::Text, black_box(&payload), MASK))
        });
        group.bench_function(format!("parse_{label}"), |b| {
            b.iter(|| Frame::parse(black_box(&wire)))
        });
    }

    group.finish();
}

fn bench_async_decode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let wire = encode_masked(OpCode::Binary, &vec![0x5A; 4096], MASK);
    let limits = Limits::default();

    let mut group = c.benchmark_group("async_decode");
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("decode_4kb", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut reader = black_box(&wire[..]);
                wsprobe::codec::decode_one_frame(&mut reader, &limits).await
            })
        })
    });
    group.finish();
}

// =============================================================================
// Masking
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for size in [64usize, 1024, 65_536] {
        let mut data = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("apply_mask_{size}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), MASK))
        });
    }

    group.finish();
}

// =============================================================================
// Handshake
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");
    let target = Target::default();
    let response = RawHttpResponse::new(
        &b"HTTP/1.1 101 Switching Protocols\r\n\
           Upgrade: websocket\r\n\
           Connection: Upgrade\r\n\
           Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"[..],
    );

    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(&target.key)))
    });
    group.bench_function("upgrade_request", |b| {
        b.iter(|| upgrade_request(black_box(&target)))
    });
    group.bench_function("verify_accept", |b| {
        b.iter(|| response.verify_accept(black_box(&target.key)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_codec,
    bench_async_decode,
    bench_masking,
    bench_handshake
);

criterion_main!(benches);
