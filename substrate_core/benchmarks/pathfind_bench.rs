use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use substrate_core::{
    Aabb, DomainQueryEngine, HierarchicalPathfinder, Point3, SeededTerrain, SubstrateConfig,
    TravelMode, TravelModel,
};

fn bench_pathfind(c: &mut Criterion) {
    let config = SubstrateConfig::builtin();
    let mut group = c.benchmark_group("pathfind");

    for span in [16i64, 32, 64] {
        group.bench_with_input(BenchmarkId::new("span", span), &span, |b, &span| {
            b.iter_batched(
                || {
                    let seed = 0x5EED;
                    let bounds = Aabb::new(Point3::from_ints(0, 0, 0), Point3::from_ints(128, 128, 32));
                    let terrain = SeededTerrain::new(seed, config.terrain());
                    let model = TravelModel::new(terrain, seed, config.travel());
                    let domain = DomainQueryEngine::new(config.domain_desc(1, bounds, seed), model);
                    let finder = HierarchicalPathfinder::new(config.pathfinding().clone());
                    (domain, finder)
                },
                |(mut domain, mut finder)| {
                    finder.pathfind(
                        &mut domain,
                        Point3::from_ints(8, 8, 0),
                        Point3::from_ints(8 + span, 8 + span / 2, 0),
                        0,
                        TravelMode::Foot.id(),
                        1_024,
                    )
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(pathfind_benches, bench_pathfind);
criterion_main!(pathfind_benches);
