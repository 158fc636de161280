use globe_terrain_core::compare_code;
use globe_terrain_storage::RecordArray;
use utilities::data_sets::{random_int_lon_lats, seeded_rng};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn queries(n: usize) -> RecordArray {
    let mut rng = seeded_rng(1);
    let mut records = RecordArray::with_capacity(4, n);
    for (i, (lon, lat)) in random_int_lon_lats(&mut rng, n).into_iter().enumerate() {
        records.push(&[i as i32, lon, lat, i as i32 % 97]);
    }

    records
}

fn record_array_sort_by_morton_code(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_array_sort_by_morton_code");
    for n in [1000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || queries(n),
                |mut records| {
                    records.sort_by(|a, b| compare_code(a[1], a[2], b[1], b[2]));
                    black_box(records)
                },
            );
        });
    }
    group.finish();
}

fn record_array_sort_by_priority(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_array_sort_by_priority");
    for n in [1000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || queries(n),
                |mut records| {
                    records.sort_by(|a, b| b[3].cmp(&a[3]));
                    black_box(records)
                },
            );
        });
    }
    group.finish();
}

fn record_array_retain_half(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_array_retain_half");
    for n in [1000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || queries(n),
                |mut records| {
                    records.retain(|r| r[0] % 2 == 0);
                    black_box(records)
                },
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    record_array_sort_by_morton_code,
    record_array_sort_by_priority,
    record_array_retain_half
);
criterion_main!(benches);
