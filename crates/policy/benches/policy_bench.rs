use criterion::{criterion_group, criterion_main, Criterion};
use policy::engine::PolicyEngine;
use policy::types::{PolicyConfig, Quorum};
use probe::ProbeOutcome;
use std::hint::black_box;
use std::time::Duration;

fn aggregate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_aggregate");

    let engine = PolicyEngine::new(PolicyConfig {
        fail_count: 3,
        recover_count: 2,
        hold_down: Duration::from_secs(0),
        quorum: Quorum::All,
        mode: "basic".to_string(),
    });

    group.bench_function("three_probe_round", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            let outcomes = vec![
                ProbeOutcome {
                    kind: "tcp".to_string(),
                    ok: true,
                    latency_ms: 1,
                    error_kind: None,
                    message: None,
                };
                3
            ];
            rt.block_on(async { black_box(engine.aggregate(outcomes).await) })
        });
    });

    group.finish();
}

criterion_group!(benches, aggregate_benchmark);
criterion_main!(benches);
