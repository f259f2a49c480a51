//! Frame codec benchmarks.
//!
//! Measures encoding a download request and decoding frames of several
//! sizes from an in-memory reader.
//!
//! Run with: cargo bench --bench framing
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use netmanthan_bridge::protocol::codec;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BODY_SIZES: &[usize] = &[64, 4 * 1024, 256 * 1024];

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let request = json!({
        "action": "download",
        "url": "https://example.org/files/test.zip",
        "filename": "test.zip",
        "mimeType": "application/zip",
        "referrer": "https://example.org/",
        "headers": [
            { "name": "Cookie", "value": "session=abc123" },
            { "name": "User-Agent", "value": "Mozilla/5.0" }
        ]
    });

    c.bench_function("encode_download_request", |b| {
        b.iter(|| codec::encode(black_box(&request)).expect("encode"));
    });
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_read_frame(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("read_frame");

    for &size in BODY_SIZES {
        let body = format!("\"{}\"", "x".repeat(size.saturating_sub(2)));
        let frame = codec::frame(body.as_bytes(), codec::MAX_INBOUND_MESSAGE_SIZE).expect("frame");

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.to_async(&rt).iter(|| async {
                let mut reader = frame.as_slice();
                codec::read_frame(&mut reader, codec::MAX_INBOUND_MESSAGE_SIZE)
                    .await
                    .expect("read")
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_encode, bench_read_frame);
criterion_main!(benches);
