//! Criterion micro-benchmarks for the message codec.
//!
//! These benchmarks measure:
//! - Single message encoding, plain and gzip
//! - Message-set encoding for growing batches
//! - Produce request encoding around a prepared message set
//!
//! Run with: `cargo bench --bench encode_bench`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kafka08::message::{Compression, Message, encode_message, encode_message_set};
use kafka08::protocol::{KafkaCodec, ProduceCodec, ProduceRequest};

fn messages(count: usize, size: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            Message::new("bench", 0, vec![b'x'; size])
                .unwrap()
                .with_key(format!("key-{i}"))
        })
        .collect()
}

/// Benchmark single message encoding with different payload sizes.
fn bench_encode_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");

    for size in [100, 1_000, 10_000, 100_000].iter() {
        let message = Message::new("bench", 0, vec![b'x'; *size]).unwrap();

        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("none", size), size, |b, _| {
            b.iter(|| encode_message(black_box(&message), Some(Compression::None)));
        });

        group.bench_with_input(BenchmarkId::new("gzip", size), size, |b, _| {
            b.iter(|| encode_message(black_box(&message), Some(Compression::Gzip)));
        });
    }

    group.finish();
}

/// Benchmark message-set encoding for growing batches of 1 KB messages.
fn bench_encode_message_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message_set");

    for count in [1, 10, 100, 1_000].iter() {
        let batch = messages(*count, 1_000);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| encode_message_set(black_box(&batch)));
        });
    }

    group.finish();
}

/// Benchmark wrapping a prepared message set into a Produce request body.
fn bench_encode_produce_request(c: &mut Criterion) {
    let set = encode_message_set(&messages(100, 1_000)).unwrap();
    let request = ProduceRequest::single(1, 1000, "bench", 0, set);

    c.bench_function("encode_produce_request", |b| {
        b.iter(|| ProduceCodec::encode_request(black_box(&request)));
    });
}

criterion_group!(
    benches,
    bench_encode_message,
    bench_encode_message_set,
    bench_encode_produce_request
);
criterion_main!(benches);
