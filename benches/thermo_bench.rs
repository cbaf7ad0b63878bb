//! Benchmarks for the compute phase and the query surface.

use criterion::{criterion_group, criterion_main, Criterion};
use recomb_rs::{
    InterpolationMode, LcdmBackground, Precision, ReionizationConfig, Thermodynamics,
    ThermoConfig,
};

fn bench_compute(c: &mut Criterion) {
    let background = LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046);
    let precision = Precision {
        nz_log: 600,
        nz_lin: 2500,
        reionization_sampling: 0.1,
        ..Default::default()
    };
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67));

    c.bench_function("compute_coarse_history", |b| {
        b.iter(|| Thermodynamics::compute(&precision, &background, &config).unwrap())
    });
}

fn bench_query(c: &mut Criterion) {
    let background = LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046);
    let precision = Precision::reduced();
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67));
    let thermo = Thermodynamics::compute(&precision, &background, &config).unwrap();

    c.bench_function("at_z_closeby_sweep", |b| {
        b.iter(|| {
            let mut cursor = 0;
            let mut sum = 0.0;
            for i in 0..1000 {
                let z = 3000.0 * i as f64 / 999.0;
                let point = thermo
                    .at_z(z, InterpolationMode::Closeby, &mut cursor, None)
                    .unwrap();
                sum += point.g;
            }
            sum
        })
    });
}

criterion_group!(benches, bench_compute, bench_query);
criterion_main!(benches);
