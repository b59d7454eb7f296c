//! Criterion benchmarks for the groupchat frame codec and address classifier.
//!
//! Run with:
//! ```bash
//! cargo bench --package groupchat-core --bench codec_bench
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use groupchat_core::{
    decode_frame, encode_frame, is_usable_network, Frame, GroupMessage, MemberId,
    NetworkSnapshot, Payload,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_frame(text_len: usize) -> Frame {
    Frame {
        cluster: "chat".to_string(),
        sender: MemberId::new("ANDROID"),
        seq: 42,
        message: GroupMessage::Data(Payload::Text("x".repeat(text_len))),
    }
}

fn make_snapshot() -> NetworkSnapshot {
    NetworkSnapshot::from_ips(
        "wlan0",
        &[
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(169, 254, 3, 4)),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
        ],
    )
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    for len in [16usize, 256, 4096] {
        let frame = make_frame(len);
        let bytes = encode_frame(&frame).expect("fixture encodes");

        group.bench_with_input(BenchmarkId::new("encode", len), &frame, |b, f| {
            b.iter(|| encode_frame(black_box(f)))
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)))
        });
    }
    group.finish();
}

fn bench_classifier(c: &mut Criterion) {
    let snapshot = make_snapshot();
    c.bench_function("is_usable_network/mixed", |b| {
        b.iter(|| is_usable_network(black_box(Some(&snapshot))))
    });
}

criterion_group!(benches, bench_codec, bench_classifier);
criterion_main!(benches);
