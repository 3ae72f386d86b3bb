use criterion::{black_box, criterion_group, criterion_main, Criterion};
use runway_engine::{initialize, Kernel, MonthPlan, SimParams};
use runway_storage::Resident;

fn bench_month(c: &mut Criterion) {
    let params = SimParams {
        chunk_size: 50_000,
        sample_size: 10_000,
        ..SimParams::default()
    };
    let mut pop = initialize(200_000, &params, params.seed, &Resident).unwrap();
    let kernel = Kernel::new(&params).unwrap();
    let plan = MonthPlan::new(&params, 0);
    c.bench_function("kernel month 200k agents", |b| {
        b.iter(|| {
            for chunk in pop.chunks_mut(params.chunk_size) {
                kernel.advance_chunk(black_box(&plan), chunk);
            }
        })
    });
}

fn bench_run(c: &mut Criterion) {
    let params = SimParams {
        months: 12,
        chunk_size: 25_000,
        sample_size: 5_000,
        ..SimParams::default()
    };
    let options = runway_engine::ExecOptions {
        progress_every: 0,
        parallel: true,
        ..Default::default()
    };
    c.bench_function("run 100k agents x 12 months", |b| {
        b.iter(|| {
            let out = runway_engine::run(100_000, params.clone(), options.clone()).unwrap();
            black_box(out.series.len())
        })
    });
}

criterion_group!(benches, bench_month, bench_run);
criterion_main!(benches);
