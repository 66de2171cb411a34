//! Integration cycle driver
//!
//! Splits the pulse metadata into fixed-length integration periods and runs
//! the full estimation chain for each:
//!
//! ```text
//! metadata ─> pulse sequence ─> per pulse: PulsePreprocessor ─┬─> CalibrationAccumulator
//!                                                             └─> LagAccumulator (per lag)
//!          ─> per lag: PerLagEstimator ─> AcfResult ─> ResultSink
//! ```
//!
//! Periods are independent. A [`WorkerPartition`] selects the periods one
//! worker handles; periods already present in the sink are skipped before
//! any sample is read.

use std::time::Instant;

use crate::ambiguity::AmbiguityIndex;
use crate::calibration::CalibrationAccumulator;
use crate::config::{DcMode, LpiConfig};
use crate::dc_offset::DcOffsetEstimator;
use crate::estimator::{LagAccumulator, LagSolution, PerLagEstimator};
use crate::lags::LagPlan;
use crate::pulse::{PulsePreprocessor, PulseSequence};
use crate::result::AcfResult;
use crate::sink::ResultSink;
use crate::source::{PulseMetadataSource, SampleSource};
use crate::types::{IQSample, LpiResult};

/// Round-robin share of the integration periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPartition {
    pub rank: usize,
    pub size: usize,
}

impl WorkerPartition {
    pub fn new(rank: usize, size: usize) -> Self {
        let size = size.max(1);
        Self {
            rank: rank % size,
            size,
        }
    }

    /// A single worker handling every period.
    pub fn single() -> Self {
        Self::new(0, 1)
    }

    /// Period indices `rank, rank + size, ...` below `n_periods`.
    pub fn periods(&self, n_periods: usize) -> impl Iterator<Item = usize> {
        (self.rank..n_periods).step_by(self.size)
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn merge(self, other: Self) -> Self {
        Self {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }
}

/// Runs the estimation chain over integration periods.
pub struct IntegrationCycleDriver<S, M> {
    config: LpiConfig,
    samples: S,
    metadata: M,
    bounds: (u64, u64),
    preprocessor: PulsePreprocessor,
    estimator: PerLagEstimator,
    indices: Vec<AmbiguityIndex>,
}

impl<S: SampleSource, M: PulseMetadataSource> IntegrationCycleDriver<S, M> {
    /// Validate `config` and prepare the per-lag index tables.
    pub fn new(config: LpiConfig, samples: S, metadata: M) -> LpiResult<Self> {
        config.validate()?;
        let plan = LagPlan::from_config(&config)?;
        let bounds = metadata.time_bounds()?;

        let dc = match config.dc.mode {
            DcMode::Fixed => config.dc.offset_sample(),
            DcMode::Estimated => estimate_dc(&config, &samples, &metadata, bounds.0)?,
        };

        let period = plan.rows().end;
        let indices = (0..plan.n_lags())
            .map(|li| AmbiguityIndex::new(period, plan.rmin(li), plan.rmax()))
            .collect();

        tracing::info!(
            channel = %config.channel,
            lags = plan.n_lags(),
            ranges = plan.n_ranges(),
            dc = %dc,
            "LPI driver ready"
        );

        Ok(Self {
            preprocessor: PulsePreprocessor::new(&config, plan, dc),
            estimator: PerLagEstimator::new(config.outlier),
            config,
            samples,
            metadata,
            bounds,
            indices,
        })
    }

    pub fn config(&self) -> &LpiConfig {
        &self.config
    }

    pub fn plan(&self) -> &LagPlan {
        self.preprocessor.plan()
    }

    /// DC offset subtracted from every echo.
    pub fn dc_offset(&self) -> IQSample {
        self.preprocessor.dc_offset()
    }

    /// Number of complete integration periods in the metadata.
    pub fn period_count(&self) -> usize {
        let (t0, t1) = self.bounds;
        (t1.saturating_sub(t0) / self.config.period_samples().max(1)) as usize
    }

    /// First metadata sample of period `ai`.
    pub fn period_start(&self, ai: usize) -> u64 {
        self.bounds.0 + ai as u64 * self.config.period_samples()
    }

    /// Estimate the ACFs of period `ai`.
    pub fn process_period(&self, ai: usize) -> LpiResult<AcfResult> {
        let i0 = self.period_start(ai);
        let span = tracing::info_span!("period", index = ai, start = i0);
        let _enter = span.enter();
        let started = Instant::now();

        let end = i0 + self.config.period_samples() + self.config.lookahead_samples;
        let sequence: PulseSequence = self.metadata.pulse_codes(i0, end)?.into_iter().collect();
        let plan = self.preprocessor.plan();

        let mut accumulators: Vec<LagAccumulator> = self
            .indices
            .iter()
            .map(|index| LagAccumulator::new(*index, plan.rows()))
            .collect();
        let mut calibration = CalibrationAccumulator::new(self.config.calibration.injection_temperature);
        let mut pulses_used = 0;

        let margin = self.config.pairing_margin();
        for k in margin..sequence.len().saturating_sub(margin) {
            let pulse_started = Instant::now();
            let products = match self.preprocessor.process(&self.samples, &sequence, k) {
                Ok(Some(products)) => products,
                Ok(None) => continue,
                Err(e) if e.is_period_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(pulse = sequence[k].0, error = %e, "skipping pulse");
                    continue;
                }
            };

            calibration.push(products.calibration);
            for (acc, group) in accumulators.iter_mut().zip(&products.lags) {
                for set in group {
                    acc.push(set)?;
                }
            }
            pulses_used += 1;
            tracing::debug!(
                pulse = products.pulse,
                code = products.code,
                elapsed_ms = pulse_started.elapsed().as_secs_f64() * 1e3,
                "prepared pulse {}/{}",
                k,
                sequence.len()
            );
        }

        let cal = calibration.finish();
        let mut result = AcfResult::new(
            i0,
            i0 as f64 / self.config.metadata_sample_rate,
            plan,
            self.config.range_gate,
            self.config.sample_rate,
        );

        for (li, solution) in self.solve_lags(&accumulators).into_iter().enumerate() {
            match solution {
                Ok(solution) => result.set_lag(li, &solution),
                Err(e) => {
                    tracing::error!(lag = li, error = %e, "lag inversion failed");
                    result.lags_failed.push(li);
                }
            }
        }

        result.system_temperature = cal.system_temperature;
        result.calibration_scale = cal.alpha;
        result.noise_power = cal.noise;
        result.dc_offset = cal.dc_offset;
        result.pass_band = self.config.filter.pass_band;
        result.filter_half_length = self.preprocessor.filter_half_length();
        result.pulses_used = pulses_used;

        tracing::info!(
            pulses = pulses_used,
            t_sys = cal.system_temperature,
            failed_lags = result.lags_failed.len(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "period done"
        );
        Ok(result)
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_lags(&self, accumulators: &[LagAccumulator]) -> Vec<LpiResult<LagSolution>> {
        accumulators
            .iter()
            .enumerate()
            .map(|(li, acc)| self.estimator.estimate(li, acc))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn solve_lags(&self, accumulators: &[LagAccumulator]) -> Vec<LpiResult<LagSolution>> {
        crate::parallel::solve_lags(&self.estimator, accumulators)
    }

    /// Process the periods of `partition`, writing each to `sink`.
    ///
    /// Periods already in the sink are skipped unless `output.reanalyze` is
    /// set. A failed period is logged and counted; the run continues.
    pub fn run(&self, partition: WorkerPartition, sink: &mut impl ResultSink) -> RunSummary {
        let mut summary = RunSummary::default();
        for ai in partition.periods(self.period_count()) {
            let start = self.period_start(ai);
            if !self.config.output.reanalyze && sink.contains(start) {
                tracing::info!(period = ai, start, "already analyzed");
                summary.skipped += 1;
                continue;
            }
            match self.process_period(ai).and_then(|result| sink.write(&result)) {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    tracing::error!(period = ai, start, error = %e, "integration period failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Estimate the DC offset from the first pulses of the dataset.
fn estimate_dc<S: SampleSource, M: PulseMetadataSource>(
    config: &LpiConfig,
    samples: &S,
    metadata: &M,
    t0: u64,
) -> LpiResult<IQSample> {
    let end = t0 + config.period_samples() + config.lookahead_samples;
    let echoes = metadata
        .pulse_codes(t0, end)?
        .into_iter()
        .take(config.dc.estimate_pulses)
        .map(|(pulse, code)| Ok((code, samples.read_echo(pulse, config.echo_length, &config.channel)?)))
        .collect::<LpiResult<Vec<_>>>()?;
    DcOffsetEstimator::new(config.dc.quiet_offset).estimate(&config.codes, &echoes)
}
