//! End-to-end checks of the LPI engine against synthetic scenarios with
//! known answers.

use approx::assert_relative_eq;
use lpi_core::config::{DcMode, PulseCodeTiming};
use lpi_core::prelude::*;
use tempfile::TempDir;

use crate::counting::CountingSource;
use crate::scenario::{PointTarget, ScenarioConfig, SyntheticScenario};

const LAGS: [usize; 3] = [5, 10, 15];

fn timing() -> PulseCodeTiming {
    PulseCodeTiming {
        noise_start: 920,
        noise_end: 980,
        tx_start: 10,
        tx_end: 60,
        ground_clutter_end: 100,
        last_echo: 900,
        extended_clutter_end: 80,
        long_pulse: false,
    }
}

/// 1000-sample echoes, 10-sample gates, one period per 6 pulses.
fn engine_config() -> LpiConfig {
    let mut config = LpiConfig::default();
    config.echo_length = 1000;
    config.range_gate = 10;
    config.max_range_delay = 800;
    config.measurement_window.start = 100;
    config.measurement_window.end = 880;
    config.tx_reference.offset = 10;
    config.tx_reference.pulse_length = 50;
    config.min_tx_frac = 0.5;
    config.lags.values = vec![5, 10, 15, 20];
    config.lags.average = 1;
    config.filter.enabled = false;
    config.calibration.background_window = 50;
    config.dc.mode = DcMode::Fixed;
    config.dc.offset = [0.0, 0.0];
    config.integration_period_s = 0.006;
    config.lookahead_samples = 0;
    config.sample_rate = 1e6;
    config.metadata_sample_rate = 1e6;
    config.codes = [(1, timing())].into_iter().collect();
    config
}

fn targets() -> Vec<PointTarget> {
    vec![
        PointTarget {
            delay: 200,
            amplitude: IQSample::new(0.8, 0.0),
            doppler: 0.05,
        },
        PointTarget {
            delay: 400,
            amplitude: IQSample::new(0.3, 0.4),
            doppler: -0.1,
        },
        PointTarget {
            delay: 600,
            amplitude: IQSample::new(0.0, 0.6),
            doppler: 0.0,
        },
    ]
}

fn target_scenario() -> SyntheticScenario {
    SyntheticScenario::new(ScenarioConfig {
        targets: targets(),
        ..Default::default()
    })
}

#[test]
fn test_recovers_point_target_acfs() {
    let scenario = target_scenario();
    let energy = scenario.transmit_energy();
    let driver = IntegrationCycleDriver::new(engine_config(), &scenario, &scenario).unwrap();
    assert_eq!(driver.period_count(), 1);

    let mut sink = MemorySink::new();
    let summary = driver.run(WorkerPartition::single(), &mut sink);
    assert_eq!(summary, RunSummary { processed: 1, skipped: 0, failed: 0 });

    let result = sink.get(0).unwrap();
    assert_eq!(result.pulses_used, 4);
    assert!(result.lags_failed.is_empty());
    assert_eq!(result.n_lags(), 3);
    assert_eq!(result.n_ranges(), 80);

    let plan = driver.plan();
    for (li, &lag) in LAGS.iter().enumerate() {
        assert_relative_eq!(result.lag_s[li], lag as f64 * 1e-6, epsilon = 1e-15);

        for r in 0..plan.rmin(li) {
            assert!(result.acf_raw[(r, li)].re.is_nan(), "lag {} range {}", lag, r);
        }

        for r in plan.ranges(li) {
            let expected = targets()
                .iter()
                .find(|t| t.delay == r * 10)
                .map(|t| t.acf(lag as f64, energy))
                .unwrap_or_default();
            let got = result.acf_raw[(r, li)];
            assert!(
                (got - expected).norm() < 1e-6 * expected.norm().max(1.0),
                "lag {} range {}: got {}, expected {}",
                lag,
                r,
                got,
                expected
            );

            // Identical pulses cancel completely after clutter subtraction.
            assert!(result.acf_mitigated[(r, li)].norm() < 1e-9);
            let variance = result.variance[(r, li)];
            assert!(variance.is_finite() && variance > 0.0);
        }
    }
}

#[test]
fn test_filtered_pipeline_estimates_every_range() {
    let scenario = SyntheticScenario::new(ScenarioConfig {
        n_pulses: 12,
        targets: targets(),
        noise_power: 0.2,
        ..Default::default()
    });
    let mut config = engine_config();
    config.integration_period_s = 0.012;
    config.filter.enabled = true;
    config.filter.half_length = 10;

    let driver = IntegrationCycleDriver::new(config, &scenario, &scenario).unwrap();
    let result = driver.process_period(0).unwrap();
    assert_eq!(result.pulses_used, 10);
    assert_eq!(result.filter_half_length, 10);
    assert!(result.lags_failed.is_empty());

    let plan = driver.plan();
    for li in 0..plan.n_lags() {
        for r in 0..plan.rmin(li) {
            assert!(result.acf_raw[(r, li)].re.is_nan());
        }
        for r in plan.ranges(li) {
            let raw = result.acf_raw[(r, li)];
            let mitigated = result.acf_mitigated[(r, li)];
            assert!(raw.re.is_finite() && raw.im.is_finite(), "lag {} range {}", li, r);
            assert!(mitigated.re.is_finite() && mitigated.im.is_finite());
            assert!(result.variance[(r, li)] > 0.0);
        }
    }
    // The strongest target still stands out against an empty gate.
    assert!(result.acf_raw[(20, 0)].norm() > 5.0 * result.acf_raw[(30, 0)].norm());
}

#[test]
fn test_skip_guard_reads_no_samples() {
    let dir = TempDir::new().unwrap();
    let source = CountingSource::new(target_scenario());
    let mut sink = JsonFileSink::new(dir.path().join("lpi_f"), 1e6);

    let driver = IntegrationCycleDriver::new(engine_config(), &source, &source).unwrap();
    assert_eq!(driver.run(WorkerPartition::single(), &mut sink).processed, 1);
    let reads = source.reads();
    assert!(reads > 0);

    let record = sink.read(0).unwrap();
    assert_eq!(record.pulses_used, 4);
    let expected = targets()[0].acf(5.0, source.inner().transmit_energy());
    assert!((record.acf_raw_at(20, 0) - expected).norm() < 1e-6 * expected.norm());

    // Second pass finds the artifact and never touches the samples.
    let summary = driver.run(WorkerPartition::single(), &mut sink);
    assert_eq!(summary, RunSummary { processed: 0, skipped: 1, failed: 0 });
    assert_eq!(source.reads(), reads);

    let mut config = engine_config();
    config.output.reanalyze = true;
    let driver = IntegrationCycleDriver::new(config, &source, &source).unwrap();
    assert_eq!(driver.run(WorkerPartition::single(), &mut sink).processed, 1);
    assert!(source.reads() > reads);
}

#[test]
fn test_noise_injection_calibration() {
    let (noise, injected) = (1.0, 4.0);
    let scenario = SyntheticScenario::new(ScenarioConfig {
        n_pulses: 40,
        noise_power: noise,
        injection: Some((920..980, injected)),
        seed: 7,
        ..Default::default()
    });
    let mut config = engine_config();
    config.integration_period_s = 0.04;
    let t_inj = config.calibration.injection_temperature;

    let driver = IntegrationCycleDriver::new(config, &scenario, &scenario).unwrap();
    let result = driver.process_period(0).unwrap();

    assert_eq!(result.pulses_used, 38);
    assert_relative_eq!(result.noise_power, noise, max_relative = 0.1);
    assert_relative_eq!(result.calibration_scale, injected / t_inj, max_relative = 0.15);
    assert_relative_eq!(result.system_temperature, noise * t_inj / injected, max_relative = 0.15);
    assert!(result.dc_offset.norm() < 0.1);
}

#[test]
fn test_estimated_dc_offset() {
    let dc = IQSample::new(-0.212, -0.221);
    let scenario = SyntheticScenario::new(ScenarioConfig {
        noise_power: 0.01,
        dc_offset: dc,
        ..Default::default()
    });
    let mut config = engine_config();
    config.dc.mode = DcMode::Estimated;
    config.dc.estimate_pulses = 5;
    config.dc.quiet_offset = 200;

    let driver = IntegrationCycleDriver::new(config, &scenario, &scenario).unwrap();
    assert!((driver.dc_offset() - dc).norm() < 0.01, "dc {}", driver.dc_offset());

    // After subtraction the local calibration DC is near zero.
    let result = driver.process_period(0).unwrap();
    assert!(result.dc_offset.norm() < 0.02);
}

#[test]
fn test_unknown_code_fails_only_its_period() {
    let mut codes = vec![1; 6];
    codes.extend([1, 1, 9, 9, 1, 1]);
    let scenario = SyntheticScenario::new(ScenarioConfig {
        n_pulses: 12,
        codes,
        targets: targets(),
        ..Default::default()
    });
    let driver = IntegrationCycleDriver::new(engine_config(), &scenario, &scenario).unwrap();
    assert_eq!(driver.period_count(), 2);

    let mut sink = MemorySink::new();
    let summary = driver.run(WorkerPartition::single(), &mut sink);
    assert_eq!(summary, RunSummary { processed: 1, skipped: 0, failed: 1 });
    assert!(sink.contains(0));
    assert!(!sink.contains(6000));
    assert!(matches!(driver.process_period(1), Err(LpiError::UnknownPulseCode { code: 9, .. })));
}

#[test]
fn test_unpaired_pulse_fails_period() {
    let scenario = SyntheticScenario::new(ScenarioConfig {
        codes: vec![1, 2, 3, 4, 5, 6],
        ..Default::default()
    });
    let mut config = engine_config();
    config.codes = (1..=6).map(|code| (code, timing())).collect();

    let driver = IntegrationCycleDriver::new(config, &scenario, &scenario).unwrap();
    assert!(driver.process_period(0).unwrap_err().is_period_fatal());
    let summary = driver.run(WorkerPartition::single(), &mut MemorySink::new());
    assert_eq!(summary.failed, 1);
}

#[test]
fn test_workers_split_periods() {
    let scenario = SyntheticScenario::new(ScenarioConfig {
        n_pulses: 18,
        targets: targets(),
        ..Default::default()
    });
    let driver = IntegrationCycleDriver::new(engine_config(), &scenario, &scenario).unwrap();
    assert_eq!(driver.period_count(), 3);

    let mut even = MemorySink::new();
    let mut odd = MemorySink::new();
    let a = driver.run(WorkerPartition::new(0, 2), &mut even);
    let b = driver.run(WorkerPartition::new(1, 2), &mut odd);
    assert_eq!(a.merge(b).processed, 3);
    assert_eq!(even.len(), 2);
    assert!(odd.contains(6000));

    // Periods with identical content give identical estimates.
    let first = even.get(0).unwrap();
    let second = odd.get(6000).unwrap();
    assert_relative_eq!(first.acf_raw[(20, 0)].re, second.acf_raw[(20, 0)].re, epsilon = 1e-9);
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_workers() {
    let scenario = SyntheticScenario::new(ScenarioConfig {
        n_pulses: 18,
        targets: targets(),
        ..Default::default()
    });
    let driver = IntegrationCycleDriver::new(engine_config(), &scenario, &scenario).unwrap();
    let summary = driver.run_workers(3, |_| MemorySink::new());
    assert_eq!(summary, RunSummary { processed: 3, skipped: 0, failed: 0 });
}
