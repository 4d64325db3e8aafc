use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pocketcache::LruCache;

fn bench_hot_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_hit", |b| {
        let mut cache = LruCache::new(1000);
        for i in 0..1000u64 {
            cache.put(i, i);
        }

        let mut counter = 0u64;
        b.iter(|| {
            black_box(cache.get(&(counter % 1000)));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_with_eviction", |b| {
        let mut cache = LruCache::new(128);
        let mut counter = 0u64;
        b.iter(|| {
            black_box(cache.put(counter, counter));
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hot_get, bench_churn);
criterion_main!(benches);
