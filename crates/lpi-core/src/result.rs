//! ACF estimates of one integration period.

use nalgebra::DMatrix;

use crate::estimator::LagSolution;
use crate::lags::LagPlan;
use crate::types::{IQSample, NAN_SAMPLE};

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// One-way range (km) of each range gate.
pub fn range_axis(n_ranges: usize, range_gate: usize, sample_rate: f64) -> Vec<f64> {
    let km_per_sample = SPEED_OF_LIGHT / sample_rate / 2.0 / 1e3;
    (0..n_ranges)
        .map(|r| (r * range_gate) as f64 * km_per_sample)
        .collect()
}

/// Range and lag resolved ACF estimates with calibration and provenance.
///
/// Matrices are indexed `(range gate, lag group)`. Ranges a lag cannot
/// estimate, and lags whose inversion failed, hold NaN.
#[derive(Debug, Clone)]
pub struct AcfResult {
    /// First sample of the period on the metadata clock
    pub start: u64,
    /// Period start (s)
    pub start_time_s: f64,
    /// ACF with ground clutter mitigation
    pub acf_mitigated: DMatrix<IQSample>,
    /// ACF without ground clutter mitigation
    pub acf_raw: DMatrix<IQSample>,
    /// Error variance
    pub variance: DMatrix<f64>,
    /// Range of each row (km)
    pub range_km: Vec<f64>,
    /// Mean lag of each column (s)
    pub lag_s: Vec<f64>,
    /// System temperature (K)
    pub system_temperature: f64,
    /// Power per kelvin
    pub calibration_scale: f64,
    /// Median background power
    pub noise_power: f64,
    /// Median local DC level of the calibration windows
    pub dc_offset: IQSample,
    /// Filter pass band (Hz)
    pub pass_band: f64,
    /// Filter half length (samples), zero when unfiltered
    pub filter_half_length: usize,
    /// Pulses that contributed to the estimate
    pub pulses_used: usize,
    /// Lag groups left NaN after a failed inversion
    pub lags_failed: Vec<usize>,
}

impl AcfResult {
    /// NaN-filled result with axes for `plan`.
    pub fn new(
        start: u64,
        start_time_s: f64,
        plan: &LagPlan,
        range_gate: usize,
        sample_rate: f64,
    ) -> Self {
        let (n_ranges, n_lags) = (plan.n_ranges(), plan.n_lags());
        Self {
            start,
            start_time_s,
            acf_mitigated: DMatrix::from_element(n_ranges, n_lags, NAN_SAMPLE),
            acf_raw: DMatrix::from_element(n_ranges, n_lags, NAN_SAMPLE),
            variance: DMatrix::from_element(n_ranges, n_lags, f64::NAN),
            range_km: range_axis(n_ranges, range_gate, sample_rate),
            lag_s: plan.mean_lags().iter().map(|l| l / sample_rate).collect(),
            system_temperature: f64::NAN,
            calibration_scale: f64::NAN,
            noise_power: f64::NAN,
            dc_offset: NAN_SAMPLE,
            pass_band: f64::NAN,
            filter_half_length: 0,
            pulses_used: 0,
            lags_failed: Vec::new(),
        }
    }

    pub fn n_ranges(&self) -> usize {
        self.acf_raw.nrows()
    }

    pub fn n_lags(&self) -> usize {
        self.acf_raw.ncols()
    }

    /// Write the solution of lag group `li` into its range slots.
    pub fn set_lag(&mut self, li: usize, solution: &LagSolution) {
        for (j, r) in solution.ranges.clone().enumerate() {
            if r >= self.n_ranges() {
                break;
            }
            self.acf_mitigated[(r, li)] = solution.mitigated[j];
            self.acf_raw[(r, li)] = solution.raw[j];
            self.variance[(r, li)] = solution.variance[j];
        }
    }
}
