//! Clustering benchmarks
//!
//! Measures single-tier expansion and the full two-tier run over synthetic
//! point batches, sequential and on the rayon pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eo_core::{
    Assigner, EngineSettings, Footprint, Observation, PlanarEngine, SeparationPolicy,
    SequentialTokens, Tier,
};

/// Deterministic scatter over `species` partitions in a 50 km square
fn observations(n: u64, species: usize) -> Vec<Observation<Footprint>> {
    let mut s: u64 = 42;
    (0..n)
        .map(|i| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let x = ((s >> 33) % 50_000) as f64;
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let y = ((s >> 33) % 50_000) as f64;
            let name = format!("species-{}", i as usize % species);
            Observation::new(i + 1, name, Footprint::point(x, y))
        })
        .collect()
}

fn policy(species: usize) -> SeparationPolicy {
    let rows: Vec<(String, f64)> = (0..species)
        .map(|i| (format!("species-{i}"), 0.5 + i as f64 * 0.25))
        .collect();
    SeparationPolicy::from_km_table(rows, 1000.0, 8.0).unwrap()
}

fn bench_eo_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("eo_tier");
    let engine = PlanarEngine::new();
    let policy = policy(4);
    let settings = EngineSettings {
        parallel: false,
        ..EngineSettings::default()
    };
    let assigner = Assigner::new(&engine, settings);

    for n in [1_000u64, 5_000, 20_000] {
        let obs = observations(n, 4);
        group.bench_with_input(BenchmarkId::from_parameter(n), &obs, |b, obs| {
            b.iter(|| {
                let mut tokens = SequentialTokens::new();
                let result = assigner
                    .cluster(black_box(obs), &[], &policy, Tier::Eo, &mut tokens)
                    .unwrap();
                black_box(result.clusters)
            });
        });
    }

    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_run");
    group.sample_size(20);
    let engine = PlanarEngine::new();
    let policy = policy(16);
    let obs = observations(20_000, 16);

    for parallel in [false, true] {
        let assigner = Assigner::new(
            &engine,
            EngineSettings {
                parallel,
                ..EngineSettings::default()
            },
        );
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut tokens = SequentialTokens::new();
                let report = assigner
                    .run(black_box(&obs), &[], &[], &policy, &mut tokens)
                    .unwrap();
                black_box(report.observations.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_eo_tier, bench_full_run);
criterion_main!(benches);
