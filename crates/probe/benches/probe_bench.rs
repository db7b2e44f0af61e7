use criterion::{criterion_group, criterion_main, Criterion};
use probe::types::Probe;
use std::hint::black_box;
use std::time::Duration;

fn tcp_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tcp_probe");

    let p = Probe::Tcp {
        target: "127.0.0.1".to_string(),
        port: 1,
        timeout: Duration::from_millis(100),
    };

    group.bench_function("tcp_connection_refused", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| rt.block_on(async { black_box(probe::run(&p).await) }));
    });

    group.finish();
}

fn http_probe_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("http_probe");

    let p = Probe::Http {
        url: "http://127.0.0.1:1/healthz".to_string(),
        timeout: Duration::from_millis(100),
    };

    group.bench_function("http_connection_error", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| rt.block_on(async { black_box(probe::run(&p).await) }));
    });

    group.finish();
}

criterion_group!(benches, tcp_probe_benchmark, http_probe_benchmark);
criterion_main!(benches);
