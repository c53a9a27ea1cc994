use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use dns_model::message::{RecordClass, RecordType};
use dns_model::test_util::*;

use dns_stub::answer::{Answer, CacheKey};
use dns_stub::cache::{Cache, LruCache};

fn make_entries(size: usize) -> Vec<(CacheKey, Answer)> {
    let mut out = Vec::with_capacity(size);
    for i in 0..size {
        let owner = format!("host{i}.example.com.");
        let request = query(&owner, RecordType::A);
        let response = answer_response(&request, vec![a_record(&owner, "10.0.0.1".parse().unwrap())]);
        let answer = Answer::from_response(
            &name(&owner),
            RecordType::A,
            RecordClass::IN,
            response,
            true,
        )
        .unwrap();
        out.push((
            CacheKey::new(name(&owner), RecordType::A, RecordClass::IN),
            answer,
        ));
    }
    out
}

fn build_cache(entries: &[(CacheKey, Answer)]) -> Cache {
    let mut cache = Cache::new();
    for (key, answer) in entries {
        cache.put(key.clone(), answer.clone());
    }
    cache
}

#[allow(non_snake_case)]
fn bench__put__unique(c: &mut Criterion) {
    let mut group = c.benchmark_group("put/unique");
    for size in [1, 100, 1000] {
        let entries = make_entries(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter(|| build_cache(entries));
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__get__hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/hit");
    for size in [1, 100, 1000] {
        let entries = make_entries(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter_batched(
                || build_cache(entries),
                |mut cache| {
                    for (key, _) in entries {
                        cache.get(key);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__get__miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/miss");
    let missing = CacheKey::new(
        name("name.which.is.unlikely.to.coincidentally.be.generated."),
        RecordType::A,
        RecordClass::IN,
    );
    for size in [1, 100, 1000] {
        let entries = make_entries(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter_batched(
                || build_cache(entries),
                |mut cache| {
                    for _ in 0..entries.len() {
                        cache.get(&missing);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__lru_put__evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_put/evicting");
    for size in [100, 1000] {
        let entries = make_entries(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter_batched(
                || LruCache::new(entries.len() / 2),
                |mut cache| {
                    for (key, answer) in entries {
                        cache.put(key.clone(), answer.clone());
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench__put__unique,
    bench__get__hit,
    bench__get__miss,
    bench__lru_put__evicting
);
criterion_main!(benches);
