//! Lag and range geometry of one analysis configuration.
//!
//! Lags are estimated in groups of `average` consecutive lag values; group
//! `li` starts at `lags[li]` and the output lag axis holds the mean of each
//! group. Measurements are kept for range-gate rows `[m0, m1)`. For each
//! group the lowest estimable range is
//!
//! ```text
//! rmin = round((window_start - tx_offset - pulse_length * min_tx_frac + lag) / range_gate)
//! ```
//!
//! so that at least `min_tx_frac` of the pulse lies past the ground clutter
//! once the lag offset is accounted for. Rounding is half-to-even.

use std::ops::Range;

use crate::config::{ConfigError, LpiConfig};

/// Lag table, lag groups and per-group range limits.
#[derive(Debug, Clone, PartialEq)]
pub struct LagPlan {
    lags: Vec<usize>,
    average: usize,
    mean_lags: Vec<f64>,
    rmins: Vec<usize>,
    rmax: usize,
    m0: usize,
    m1: usize,
}

impl LagPlan {
    /// Derive the plan from a configuration.
    pub fn from_config(config: &LpiConfig) -> Result<Self, ConfigError> {
        let rg = config.range_gate as f64;
        let lags = config.lags.values.clone();
        let average = config.lags.average;
        let n_groups = lags.len().saturating_sub(average);

        let mean_lags = (0..n_groups)
            .map(|li| lags[li..li + average].iter().sum::<usize>() as f64 / average as f64)
            .collect();

        let window = config.measurement_window;
        let m0 = (window.start as f64 / rg).round_ties_even() as usize;
        let m1 = (window.end as f64 / rg).round_ties_even() as usize;
        if m0 >= m1 {
            return Err(ConfigError::ValidationError(format!(
                "measurement window maps to empty rows [{}, {})",
                m0, m1
            )));
        }

        // Each decimated ambiguity must cover the circular index range [0, m1)
        let max_lag = lags.iter().copied().max().unwrap_or(0);
        let shortest = config.echo_length.saturating_sub(max_lag) / config.range_gate;
        if shortest < m1 {
            return Err(ConfigError::ValidationError(format!(
                "decimated lag product of {} rows is shorter than measurement end row {}",
                shortest, m1
            )));
        }

        let rmax = config.n_ranges();
        let tx = config.tx_reference;
        let mut rmins = Vec::with_capacity(n_groups);
        for &lag in &lags[..n_groups] {
            let delay = window.start as f64 - tx.offset as f64
                - tx.pulse_length as f64 * config.min_tx_frac
                + lag as f64;
            let rmin = (delay / rg).round_ties_even();
            if rmin < 0.0 || rmin as usize >= rmax {
                return Err(ConfigError::ValidationError(format!(
                    "lag {}: minimum range gate {} outside [0, {})",
                    lag, rmin, rmax
                )));
            }
            rmins.push(rmin as usize);
        }

        Ok(Self {
            lags,
            average,
            mean_lags,
            rmins,
            rmax,
            m0,
            m1,
        })
    }

    /// Number of estimated lag groups.
    pub fn n_lags(&self) -> usize {
        self.rmins.len()
    }

    /// Number of range gates.
    pub fn n_ranges(&self) -> usize {
        self.rmax
    }

    /// Lag values (samples) contributing to group `li`.
    pub fn group(&self, li: usize) -> &[usize] {
        &self.lags[li..li + self.average]
    }

    /// Mean lag of every group, in samples.
    pub fn mean_lags(&self) -> &[f64] {
        &self.mean_lags
    }

    /// Lowest estimable range gate for group `li`.
    pub fn rmin(&self, li: usize) -> usize {
        self.rmins[li]
    }

    pub fn rmax(&self) -> usize {
        self.rmax
    }

    /// Range gates estimated for group `li`.
    pub fn ranges(&self, li: usize) -> Range<usize> {
        self.rmins[li]..self.rmax
    }

    /// Range-gate rows kept from every decimated lag product.
    pub fn rows(&self) -> Range<usize> {
        self.m0..self.m1
    }

    /// Number of measurement rows per lag product.
    pub fn n_meas(&self) -> usize {
        self.m1 - self.m0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan() {
        let config = LpiConfig::default();
        let plan = LagPlan::from_config(&config).unwrap();
        assert_eq!(plan.n_lags(), 44);
        assert_eq!(plan.group(0), &[10, 20]);
        assert_eq!(plan.mean_lags()[0], 15.0);
        assert_eq!(plan.rows(), 13..129);
        assert_eq!(plan.rmax(), 116);
        // (800 - 111 - 240 + 10) / 60 = 7.65
        assert_eq!(plan.rmin(0), 8);
    }

    #[test]
    fn test_rmin_monotone_in_lag() {
        for (rg, frac) in [(30, 0.4), (60, 0.5), (120, 0.1), (240, 0.0)] {
            let mut config = LpiConfig::default();
            config.range_gate = rg;
            config.min_tx_frac = frac;
            let plan = LagPlan::from_config(&config).unwrap();
            for li in 1..plan.n_lags() {
                assert!(
                    plan.rmin(li) >= plan.rmin(li - 1),
                    "rg {} lag group {}: {} < {}",
                    rg, li, plan.rmin(li), plan.rmin(li - 1)
                );
            }
        }
    }

    #[test]
    fn test_half_to_even_rounding() {
        let mut config = LpiConfig::default();
        config.range_gate = 10;
        config.measurement_window.start = 105;
        config.measurement_window.end = 7750;
        config.tx_reference.offset = 0;
        config.min_tx_frac = 0.0;
        config.lags.values = vec![10, 20, 30];
        config.lags.average = 1;
        let plan = LagPlan::from_config(&config).unwrap();
        // (105 + 10) / 10 = 11.5 -> 12, (105 + 20) / 10 = 12.5 -> 12
        assert_eq!(plan.rmin(0), 12);
        assert_eq!(plan.rmin(1), 12);
        // 105 / 10 = 10.5 -> 10
        assert_eq!(plan.rows().start, 10);
    }

    #[test]
    fn test_window_beyond_lag_product_rejected() {
        let mut config = LpiConfig::default();
        config.measurement_window.end = 9_900;
        assert!(LagPlan::from_config(&config).is_err());
    }
}
