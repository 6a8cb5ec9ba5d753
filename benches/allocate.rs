use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ctd_processor::allocator::{IdAllocator, generate_candidate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

fn seeded_catalog(size: usize) -> HashSet<String> {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut ids = HashSet::with_capacity(size);
    while ids.len() < size {
        ids.insert(generate_candidate(&mut rng));
    }
    ids
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    for size in [10_000usize, 1_000_000] {
        let existing = seeded_catalog(size);
        group.bench_function(format!("1000 ids against {}", size), |b| {
            b.iter_batched(
                || IdAllocator::with_rng(existing.clone(), StdRng::seed_from_u64(7)),
                |mut allocator| black_box(allocator.allocate_many(1_000)),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_allocate);
criterion_main!(benches);
