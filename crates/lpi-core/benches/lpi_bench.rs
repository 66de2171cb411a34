//! Benchmarks for the LPI hot paths
//!
//! Run with: cargo bench -p lpi-core --bench lpi_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lpi_core::ambiguity::AmbiguityIndex;
use lpi_core::config::{FilterNormalization, LpiConfig, OutlierConfig};
use lpi_core::decimator::Decimator;
use lpi_core::estimator::{LagAccumulator, PerLagEstimator};
use lpi_core::filter::LowPassFilter;
use lpi_core::lags::LagPlan;
use lpi_core::pulse::LagProductSet;
use lpi_core::types::complex_ops::lag_product;
use lpi_core::types::{IQBuffer, IQSample};

fn echo(n: usize, seed: usize) -> IQBuffer {
    (0..n)
        .map(|t| {
            let x = ((t * 7919 + seed * 104_729) % 65_521) as f64 / 65_521.0;
            IQSample::from_polar(1.0 + x, 6.283 * x)
        })
        .collect()
}

// ============================================================================
// Filter and Decimation Benchmarks
// ============================================================================

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("low_pass_filter");

    for half_length in [10, 20, 40].iter() {
        let filter = LowPassFilter::new(10_000, 1e6, 120e3, *half_length, FilterNormalization::UnitEnergy);
        let z = echo(10_000, 1);
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(BenchmarkId::new("apply", half_length), half_length, |b, _| {
            b.iter(|| filter.apply(black_box(&z)))
        });
    }

    group.finish();
}

fn bench_lag_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("lag_products");
    let z = echo(10_000, 2);

    for rg in [30, 60, 120].iter() {
        let decim = Decimator::new(10_000, *rg);
        group.bench_with_input(BenchmarkId::new("decimated", rg), rg, |b, _| {
            b.iter(|| decim.decimate(&lag_product(black_box(&z), 240)))
        });
    }

    group.finish();
}

// ============================================================================
// Inversion Benchmarks
// ============================================================================

fn bench_lag_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("lag_solve");
    group.sample_size(20);

    let config = LpiConfig::default();
    let plan = LagPlan::from_config(&config).expect("default plan");
    let decim = Decimator::new(config.echo_length, config.range_gate);
    let index = AmbiguityIndex::new(plan.rows().end, plan.rmin(0), plan.rmax());

    for n_pulses in [50, 200].iter() {
        let mut acc = LagAccumulator::new(index, plan.rows());
        for p in 0..*n_pulses {
            let mut tx = echo(config.echo_length, p);
            for (t, x) in tx.iter_mut().enumerate() {
                if !(76..624).contains(&t) {
                    *x = IQSample::new(0.0, 0.0);
                }
            }
            let meas = echo(plan.n_meas(), p + 1000);
            acc.push(&LagProductSet {
                lag: 10,
                ambiguity: decim.decimate(&lag_product(&tx, 10)),
                mitigated: meas.clone(),
                raw: meas,
            })
            .expect("consistent shapes");
        }

        let estimator = PerLagEstimator::new(OutlierConfig::default());
        group.bench_with_input(BenchmarkId::new("pulses", n_pulses), n_pulses, |b, _| {
            b.iter(|| estimator.estimate(0, black_box(&acc)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filter, bench_lag_products, bench_lag_solve);
criterion_main!(benches);
