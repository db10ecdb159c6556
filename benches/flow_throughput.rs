//! Benchmarks for flow execution
//!
//! This benchmark measures:
//! - Per-run overhead of the stage tasks and pipes
//! - Streaming throughput through several stages
//! - Cache hit cost compared to running the wrapped handler

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowkit::{handler_fn, Cache, Context, Flow, Handler};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn passthrough() -> impl Handler {
    handler_fn(|_ctx, input, output| {
        Box::pin(async move {
            tokio::io::copy(input, output).await?;
            Ok(())
        })
    })
}

fn upper() -> impl Handler {
    handler_fn(|_ctx, input, output| {
        Box::pin(async move {
            let mut chunk = [0u8; 4096];
            loop {
                let n = input.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(());
                }
                output.write_all(&chunk[..n].to_ascii_uppercase()).await?;
            }
        })
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_stage_overhead(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("stage_overhead");

    for stages in [1usize, 4, 16] {
        let flow = (0..stages).fold(Flow::new(), |flow, _| flow.use_handler(passthrough()));
        group.bench_with_input(BenchmarkId::from_parameter(stages), &flow, |b, flow| {
            b.to_async(&rt).iter(|| async {
                let mut out = Vec::new();
                flow.run(&Context::background(), black_box("ping"), &mut out)
                    .await
                    .unwrap();
                black_box(out)
            })
        });
    }

    group.finish();
}

fn bench_streaming_throughput(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("streaming_throughput");

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| b'a' + (i % 26) as u8).collect();
    group.throughput(Throughput::Bytes(payload.len() as u64));

    let flow = Flow::new()
        .use_handler(upper())
        .use_handler(passthrough())
        .use_handler(upper());

    group.bench_function("1MiB_three_stages", |b| {
        b.to_async(&rt).iter(|| async {
            let mut out = Vec::new();
            flow.run(&Context::background(), bytes::Bytes::from(payload.clone()), &mut out)
                .await
                .unwrap();
            black_box(out)
        })
    });

    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("cache");

    let cached = rt.block_on(async {
        Flow::new().use_handler(Cache::new(upper(), Duration::from_secs(3600)))
    });
    let uncached = Flow::new().use_handler(upper());

    group.bench_function("hit", |b| {
        b.to_async(&rt).iter(|| async {
            let mut out = String::new();
            cached
                .run(&Context::background(), "a cached request", &mut out)
                .await
                .unwrap();
            black_box(out)
        })
    });

    group.bench_function("no_cache", |b| {
        b.to_async(&rt).iter(|| async {
            let mut out = String::new();
            uncached
                .run(&Context::background(), "a cached request", &mut out)
                .await
                .unwrap();
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_stage_overhead,
    bench_streaming_throughput,
    bench_cache_hit,
);
criterion_main!(benches);
