//! Method registry benchmarks.
//!
//! Lookup and construction cost per protocol version.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use warren_protocol::{FieldTable, MethodKind, MethodRegistry, METHOD_HEADER_SIZE, SUPPORTED_VERSIONS, V0_91};

/// Benchmark (class, method) resolution for every version.
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for version in SUPPORTED_VERSIONS {
        let registry = MethodRegistry::for_version(version).unwrap();
        let flow = registry.create_channel_flow(true).unwrap();
        let (class_id, method_id) = (flow.class_id(), flow.method_id());
        let args = flow.encode().slice(METHOD_HEADER_SIZE..);

        group.bench_with_input(BenchmarkId::new("channel.flow", version), &args, |b, args| {
            b.iter(|| registry.resolve(black_box(class_id), black_box(method_id), args.clone()))
        });
    }

    let registry = MethodRegistry::for_version(V0_91).unwrap();
    group.bench_function("unknown_class", |b| {
        b.iter(|| registry.resolve(black_box(200), black_box(10), Bytes::new()))
    });

    group.finish();
}

/// Benchmark whole-payload decoding of a large handshake method.
fn bench_decode_start_ok(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let registry = MethodRegistry::for_version(V0_91).unwrap();

    for size in [16usize, 1024, 16 * 1024] {
        let payload = registry
            .create_connection_start_ok(
                FieldTable::new(),
                "PLAIN",
                Bytes::from(vec![b'x'; size]),
                "en_US",
            )
            .unwrap()
            .encode();
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::new("start-ok", size), &payload, |b, payload| {
            b.iter(|| registry.decode(payload.clone()))
        });
    }

    group.finish();
}

/// Benchmark version-correct method construction.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for version in SUPPORTED_VERSIONS {
        let registry = MethodRegistry::for_version(version).unwrap();
        group.bench_function(BenchmarkId::new("basic.deliver", version), |b| {
            b.iter(|| {
                registry.create_basic_deliver(
                    black_box("ctag-1"),
                    black_box(42),
                    false,
                    "amq.direct",
                    "orders",
                )
            })
        });
        group.bench_function(BenchmarkId::new("connection.close", version), |b| {
            b.iter(|| registry.create_connection_close(504, black_box("Unknown channel id: 5"), 20, 20))
        });
        assert!(registry.declares(MethodKind::BasicDeliver));
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_decode_start_ok, bench_create);
criterion_main!(benches);
