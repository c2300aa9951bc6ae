use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dnscourier::{QueryEncoder, SessionId, BASE32_ALPHABET, MAX_QUERY_LEN};

/// Benchmark building a single full-capacity query
fn bench_build_query(c: &mut Criterion) {
    let encoder = QueryEncoder::new("tunnel.example.com");
    let id = SessionId::new("ABCDEFGHIJKLM").unwrap();
    let cap = encoder.capacity(MAX_QUERY_LEN).unwrap();
    let payload: Vec<u8> = (0..cap).map(|i| BASE32_ALPHABET[i % 32]).collect();

    let mut group = c.benchmark_group("build_query");
    group.throughput(Throughput::Bytes(cap as u64));

    group.bench_function("full_capacity_fragment", |b| {
        b.iter(|| {
            encoder
                .build_query(0, &id, black_box(&payload), MAX_QUERY_LEN)
                .unwrap()
                .unwrap()
        });
    });

    group.finish();
}

/// Benchmark the whole pipeline: base32 encode plus the query sequence
fn bench_encode_message(c: &mut Criterion) {
    let encoder = QueryEncoder::new("tunnel.example.com");
    let id = SessionId::new("ABCDEFGHIJKLM").unwrap();

    let mut group = c.benchmark_group("encode_message");
    for size in [256usize, 1024, 2048] {
        let raw: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| encoder.encode_message(&id, black_box(raw), MAX_QUERY_LEN).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_query, bench_encode_message);
criterion_main!(benches);
