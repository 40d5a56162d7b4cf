//! Criterion benchmarks across the LPM engines.

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lpm_bench::bloom::DxrBloom;
use lpm_bench::dir24_8::Dir24_8;
use lpm_bench::dxr::Dxr;
use lpm_bench::dynamic::DynamicDir24_8;
use lpm_bench::engine::LpmEngine;
use lpm_bench::key_pool::KeyPool;
use lpm_bench::patricia::PatriciaTrie;
use lpm_bench::prefix::{mask_from_len, Prefix, PrefixRecord};
use lpm_bench::radix::RadixTrie;

fn synth_fib(n: usize, rng: &mut StdRng) -> (KeyPool, Vec<PrefixRecord>) {
    let mut pool = KeyPool::new();
    let mut seen: HashSet<Prefix> = HashSet::with_capacity(n);
    let mut records = Vec::with_capacity(n);
    while records.len() < n {
        let len = rng.gen_range(8..=32u8);
        let prefix = Prefix::new(rng.gen::<u32>(), len);
        if !seen.insert(prefix) {
            continue;
        }
        let mut key = [0u8; 64];
        rng.fill(&mut key[..]);
        records.push(PrefixRecord {
            prefix,
            key: pool.intern_bytes(key),
        });
    }
    records.sort_by_key(|r| std::cmp::Reverse(r.prefix.len()));
    (pool, records)
}

/// Addresses sampled from inside the stored prefixes (mostly hits).
fn synth_ips(records: &[PrefixRecord], count: usize, rng: &mut StdRng) -> Vec<u32> {
    (0..count)
        .map(|_| {
            let rec = records[rng.gen_range(0..records.len())];
            let host = rng.gen::<u32>() & !mask_from_len(rec.prefix.len());
            rec.prefix.net() | host
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xF1B);
    let mut group = c.benchmark_group("build");

    for size in [1_000, 10_000, 100_000] {
        let (_pool, records) = synth_fib(size, &mut rng);

        group.bench_with_input(BenchmarkId::new("RadixTrie", size), &records, |b, recs| {
            b.iter(|| black_box(RadixTrie::build(recs)));
        });
        group.bench_with_input(
            BenchmarkId::new("PatriciaTrie", size),
            &records,
            |b, recs| {
                b.iter(|| black_box(PatriciaTrie::build(recs)));
            },
        );
        group.bench_with_input(BenchmarkId::new("DXR", size), &records, |b, recs| {
            b.iter(|| black_box(Dxr::build(recs)));
        });
    }
    group.finish();

    // The /24-stride tables zero 2^24 cells per build; sample sparsely.
    let mut group = c.benchmark_group("build_dir24_8");
    group.sample_size(10);
    for size in [10_000, 100_000] {
        let (_pool, records) = synth_fib(size, &mut rng);
        group.bench_with_input(BenchmarkId::new("DIR-24-8", size), &records, |b, recs| {
            b.iter(|| black_box(Dir24_8::build(recs)));
        });
        group.bench_with_input(
            BenchmarkId::new("DIR-24-8-dyn", size),
            &records,
            |b, recs| {
                b.iter(|| black_box(DynamicDir24_8::build(recs)));
            },
        );
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x10F);
    let size = 100_000;
    let (_pool, records) = synth_fib(size, &mut rng);
    let ips = synth_ips(&records, 10_000, &mut rng);

    let radix = RadixTrie::build(&records);
    let patricia = PatriciaTrie::build(&records);
    let dir = Dir24_8::build(&records);
    let dxr = Dxr::build(&records);
    let bloom = DxrBloom::build(&records);
    let dynamic = DynamicDir24_8::build(&records);

    fn sweep<E: LpmEngine>(engine: &E, ips: &[u32]) -> usize {
        ips.iter().filter(|&&ip| engine.lookup(ip).is_some()).count()
    }

    let mut group = c.benchmark_group("lookup");
    group.bench_function(BenchmarkId::new("RadixTrie", size), |b| {
        b.iter(|| black_box(sweep(&radix, &ips)));
    });
    group.bench_function(BenchmarkId::new("PatriciaTrie", size), |b| {
        b.iter(|| black_box(sweep(&patricia, &ips)));
    });
    group.bench_function(BenchmarkId::new("DIR-24-8", size), |b| {
        b.iter(|| black_box(sweep(&dir, &ips)));
    });
    group.bench_function(BenchmarkId::new("DXR", size), |b| {
        b.iter(|| black_box(sweep(&dxr, &ips)));
    });
    group.bench_function(BenchmarkId::new("DXR+Bloom", size), |b| {
        b.iter(|| black_box(sweep(&bloom, &ips)));
    });
    group.bench_function(BenchmarkId::new("DIR-24-8-dyn", size), |b| {
        b.iter(|| black_box(sweep(&dynamic, &ips)));
    });
    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xD1F);
    let (mut pool, records) = synth_fib(10_000, &mut rng);

    // Host routes only: the cheapest delete path, the one callers are
    // expected to stay on for sub-millisecond updates.
    let updates: Vec<(Prefix, _)> = (0..1_000)
        .map(|_| {
            let prefix = Prefix::new(rng.gen::<u32>(), 32);
            let mut key = [0u8; 64];
            rng.fill(&mut key[..]);
            (prefix, pool.intern_bytes(key))
        })
        .collect();

    let mut group = c.benchmark_group("dynamic_updates");
    group.sample_size(10);
    group.bench_function("insert_delete_host_routes", |b| {
        let mut engine = DynamicDir24_8::build(&records);
        b.iter(|| {
            for &(prefix, key) in &updates {
                engine.insert(prefix, key);
            }
            for &(prefix, _) in &updates {
                engine.remove(prefix);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup, bench_updates);
criterion_main!(benches);
