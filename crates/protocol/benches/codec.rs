//! Performance benchmarks for the wire codec.
//!
//! These benchmarks measure the per-frame hot paths:
//! - Quest encoding in both payload formats
//! - Frame decoding
//! - Stream encryption throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use protocol::{AesKeyBits, FrameCodec, PayloadFormat, Quest, SessionKeys};

fn quest_with_blob(size: usize, format: PayloadFormat) -> Quest {
    let mut quest = Quest::with_format("upload", true, format)
        .with_param("name", "chunk")
        .with_param("offset", 4096)
        .with_param("data", vec![0xabu8; size]);
    quest.set_seq_num(1);
    quest
}

/// Benchmark quest encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_quest");
    let codec = FrameCodec::new();

    for (name, size) in [("small_16B", 16), ("medium_4KB", 4096), ("large_64KB", 65536)] {
        let quest = quest_with_blob(size, PayloadFormat::MessagePack);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(name, |b| {
            b.iter(|| codec.encode_quest(black_box(&quest)))
        });
    }

    // JSON has no binary type, so keep it small.
    let quest = Quest::new("echo")
        .with_param("x", 1)
        .with_param("text", "hello world");
    let json = {
        let mut q = Quest::with_format("echo", true, PayloadFormat::Json);
        q.set_payload(quest.payload().clone());
        q
    };
    group.bench_function("json_small", |b| {
        b.iter(|| codec.encode_quest(black_box(&json)))
    });

    group.finish();
}

/// Benchmark frame decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    let codec = FrameCodec::new();

    for (name, size) in [("small_16B", 16), ("medium_4KB", 4096), ("large_64KB", 65536)] {
        let bytes = codec
            .encode_quest(&quest_with_blob(size, PayloadFormat::MessagePack))
            .unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(name, |b| b.iter(|| codec.decode(black_box(&bytes))));
    }

    group.finish();
}

/// Benchmark in-place stream encryption.
fn bench_stream_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_cipher");
    let secret = [0x5au8; 32];

    for bits in [AesKeyBits::Aes128, AesKeyBits::Aes256] {
        let keys = SessionKeys::derive(&secret, bits);
        let mut encryptor = keys.encryptor().unwrap();
        let mut buffer = vec![0u8; 4096];

        group.throughput(Throughput::Bytes(buffer.len() as u64));
        group.bench_function(format!("aes{}_4KB", bits.bits()), |b| {
            b.iter(|| encryptor.encrypt(black_box(&mut buffer)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream_cipher);

criterion_main!(benches);
