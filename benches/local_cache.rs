//! Benchmark: local cache hit, miss and eviction paths

use citycode_core::cache::{CacheConfig, LocalCache};
use citycode_core::telemetry::{BrokerSink, Emitter, TelemetryConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

fn bench_cache(max_size: usize) -> LocalCache {
    LocalCache::new(CacheConfig::builder().max_size(max_size).build()).unwrap()
}

fn benchmark_local_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = bench_cache(10);
    rt.block_on(async {
        for i in 0..10 {
            cache.set(format!("city:{}", i), "XX").await;
        }
    });

    c.bench_function("local_hit", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cache.get("city:5").await) });
    });
}

fn benchmark_local_miss(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = bench_cache(10);

    c.bench_function("local_miss", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cache.get("city:absent").await) });
    });
}

fn benchmark_set_with_eviction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = bench_cache(10);
    let mut counter = 0u64;

    c.bench_function("set_evicting", |b| {
        b.to_async(&rt).iter(|| {
            counter += 1;
            let key = format!("city:{}", counter);
            let cache = &cache;
            async move { cache.set(key, "XX").await }
        });
    });
}

/// Broker that accepts everything instantly
struct DiscardSink;

#[async_trait::async_trait]
impl BrokerSink for DiscardSink {
    async fn connect(&self) -> citycode_core::Result<()> {
        Ok(())
    }

    async fn send(&self, _: &str, _: Option<&str>, _: &[u8]) -> citycode_core::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> citycode_core::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    fn name(&self) -> &str {
        "discard"
    }
}

fn benchmark_record_request(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let emitter = rt.block_on(async {
        Emitter::start(TelemetryConfig::default(), Arc::new(DiscardSink)).unwrap()
    });

    c.bench_function("record_request", |b| {
        b.iter(|| black_box(emitter.record_request("Paris", Duration::from_micros(250), true, 200)));
    });

    rt.block_on(async { emitter.close().await.ok() });
}

criterion_group!(
    benches,
    benchmark_local_hit,
    benchmark_local_miss,
    benchmark_set_with_eviction,
    benchmark_record_request
);
criterion_main!(benches);
