//! Per-lag weighted least-squares inversion
//!
//! For one lag group, every pulse contributes a design block `A_p` and two
//! measurement vectors over the measurement rows: the raw lag products
//! `m_e` and the clutter-mitigated lag products `m_g`. The model is
//!
//! ```text
//! m = A x + noise,     Var(noise_i) = s_i^2
//! ```
//!
//! where `x` is the ACF of the lag across range. The noise scale `s_i` is
//! not known a priori and is estimated robustly from the data:
//!
//! 1. per measurement row, `sqrt(2 * P_q(|m|^2))` across pulses (`q` = 34
//!    by default), separately for `m_e` and `m_g`
//! 2. a localized scale: centered circular moving mean of `|m_e|^2` across
//!    pulses, square-rooted and floored at its median `msig`
//!
//! Entries far above the row scale or with a localized scale far above
//! `msig` are rejected, the rest are whitened by the localized scale and the
//! normal equations
//!
//! ```text
//! (A^H S^-2 A) x = A^H S^-2 m
//! ```
//!
//! are accumulated block by block and solved by explicit inversion, which
//! also yields the error variance `diag((A^H S^-2 A)^-1)`.

use std::ops::Range;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::ambiguity::AmbiguityIndex;
use crate::config::OutlierConfig;
use crate::pulse::LagProductSet;
use crate::sparse::StackedDesign;
use crate::stats::{circular_moving_mean, nan_median, nan_percentile};
use crate::types::complex_ops::is_valid;
use crate::types::{IQBuffer, IQSample, LpiError, LpiResult, NAN_SAMPLE, ZERO_SAMPLE};

/// Design blocks and measurements of one lag group over a period.
#[derive(Debug, Clone)]
pub struct LagAccumulator {
    index: AmbiguityIndex,
    rows: Range<usize>,
    design: StackedDesign,
    mitigated: IQBuffer,
    raw: IQBuffer,
}

impl LagAccumulator {
    /// Empty accumulator keeping design rows `rows`.
    pub fn new(index: AmbiguityIndex, rows: Range<usize>) -> Self {
        let design = StackedDesign::new(rows.len(), index.n_cols());
        Self {
            index,
            rows,
            design,
            mitigated: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Add one pulse's products of one lag.
    pub fn push(&mut self, set: &LagProductSet) -> LpiResult<()> {
        let n_meas = self.n_meas();
        for len in [set.mitigated.len(), set.raw.len()] {
            if len != n_meas {
                return Err(LpiError::ShapeMismatch {
                    expected: n_meas,
                    actual: len,
                });
            }
        }
        let block = self.index.gather(&set.ambiguity, self.rows.clone())?;
        self.design.push(block)?;
        self.mitigated.extend_from_slice(&set.mitigated);
        self.raw.extend_from_slice(&set.raw);
        Ok(())
    }

    pub fn index(&self) -> &AmbiguityIndex {
        &self.index
    }

    pub fn n_meas(&self) -> usize {
        self.rows.len()
    }

    pub fn n_blocks(&self) -> usize {
        self.design.n_blocks()
    }

    pub fn design(&self) -> &StackedDesign {
        &self.design
    }

    pub fn mitigated(&self) -> &[IQSample] {
        &self.mitigated
    }

    pub fn raw(&self) -> &[IQSample] {
        &self.raw
    }
}

/// Robust noise scale estimates of one lag group.
///
/// Measurement vectors are laid out block-major: entry `b * n_meas + c` is
/// measurement row `c` of block `b`.
///
/// A row holding any invalid entry has no row scale (NaN), takes no part in
/// the median `msig` and is not screened again. Estimating and rejecting a
/// second time on already screened data therefore leaves earlier survivors
/// in those rows untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustScale {
    n_meas: usize,
    /// Per-row scale of the raw products
    pub raw: Vec<f64>,
    /// Per-row scale of the mitigated products
    pub mitigated: Vec<f64>,
    /// Localized scale per entry, floored at `median`
    pub localized: Vec<f64>,
    /// Median of the localized scale over complete rows
    pub median: f64,
    /// Rows whose raw products are all valid
    pub complete: Vec<bool>,
}

impl RobustScale {
    pub fn estimate(
        raw: &[IQSample],
        mitigated: &[IQSample],
        n_meas: usize,
        config: &OutlierConfig,
    ) -> Self {
        let n_blocks = if n_meas == 0 { 0 } else { raw.len() / n_meas };
        let power = |m: &[IQSample], c: usize| -> Vec<f64> {
            (0..n_blocks).map(|b| m[b * n_meas + c].norm_sqr()).collect()
        };
        let column_scale = |m: &[IQSample]| -> Vec<f64> {
            (0..n_meas)
                .map(|c| {
                    let p = power(m, c);
                    if p.iter().any(|x| x.is_nan()) {
                        return f64::NAN;
                    }
                    (2.0 * nan_percentile(p, config.scale_percentile)).sqrt()
                })
                .collect()
        };
        let complete: Vec<bool> = (0..n_meas)
            .map(|c| n_blocks > 0 && power(raw, c).iter().all(|x| !x.is_nan()))
            .collect();

        let mut localized = vec![f64::NAN; n_blocks * n_meas];
        for c in 0..n_meas {
            let smoothed = circular_moving_mean(&power(raw, c), config.localized_window);
            for (b, p) in smoothed.into_iter().enumerate() {
                localized[b * n_meas + c] = p.sqrt();
            }
        }

        let mut median = nan_median(
            localized
                .iter()
                .enumerate()
                .filter(|(i, _)| complete[i % n_meas])
                .map(|(_, &s)| s),
        );
        if !(median.is_finite() && median > 0.0) {
            median = 1.0;
        }
        for s in localized.iter_mut() {
            if *s < median {
                *s = median;
            }
        }

        Self {
            n_meas,
            raw: column_scale(raw),
            mitigated: column_scale(mitigated),
            localized,
            median,
            complete,
        }
    }

    /// Mark outliers in `raw` and `mitigated` as NaN. Repeating the call with
    /// the same scale changes nothing. Incomplete rows are skipped.
    pub fn reject_outliers(
        &self,
        raw: &mut [IQSample],
        mitigated: &mut [IQSample],
        config: &OutlierConfig,
    ) -> usize {
        let localized_limit = config.localized_limit * self.median;
        let mut rejected = 0;
        for i in 0..raw.len() {
            let c = i % self.n_meas;
            let mut reject_raw = raw[i].norm() / self.raw[c] > config.ratio_limit;
            let mut reject_mitigated = mitigated[i].norm() / self.mitigated[c] > config.ratio_limit;
            if self.complete[c] && self.localized[i] > localized_limit {
                reject_raw = true;
                reject_mitigated = true;
            }
            if reject_raw && is_valid(raw[i]) {
                raw[i] = NAN_SAMPLE;
                rejected += 1;
            }
            if reject_mitigated && is_valid(mitigated[i]) {
                mitigated[i] = NAN_SAMPLE;
                rejected += 1;
            }
        }
        rejected
    }
}

/// Estimated ACF of one lag group across range.
#[derive(Debug, Clone)]
pub struct LagSolution {
    /// Range gates covered by the solution vectors
    pub ranges: Range<usize>,
    /// With clutter mitigation
    pub mitigated: DVector<IQSample>,
    /// Without clutter mitigation
    pub raw: DVector<IQSample>,
    /// Error variance per range
    pub variance: DVector<f64>,
    /// Rows used in the fit
    pub n_valid: usize,
    /// Rows available before outlier rejection
    pub n_total: usize,
}

/// Robust per-lag inversion.
#[derive(Debug, Clone)]
pub struct PerLagEstimator {
    outlier: OutlierConfig,
}

impl PerLagEstimator {
    pub fn new(outlier: OutlierConfig) -> Self {
        Self { outlier }
    }

    /// Solve lag group `li` from its accumulated blocks.
    pub fn estimate(&self, li: usize, acc: &LagAccumulator) -> LpiResult<LagSolution> {
        let start = Instant::now();
        let n_meas = acc.n_meas();
        let n_total = acc.design().n_rows();
        if n_total == 0 {
            return Err(LpiError::NoValidMeasurements { lag: li });
        }

        let scale = RobustScale::estimate(acc.raw(), acc.mitigated(), n_meas, &self.outlier);
        let mut raw = acc.raw().to_vec();
        let mut mitigated = acc.mitigated().to_vec();
        let rejected = scale.reject_outliers(&mut raw, &mut mitigated, &self.outlier);

        let n = acc.design().n_cols();
        let mut info = DMatrix::from_element(n, n, ZERO_SAMPLE);
        let mut rhs_raw = DVector::from_element(n, ZERO_SAMPLE);
        let mut rhs_mitigated = DVector::from_element(n, ZERO_SAMPLE);
        let mut n_valid = 0;

        for r in 0..n_total {
            let s = scale.localized[r];
            if !(s.is_finite() && is_valid(raw[r]) && is_valid(mitigated[r])) {
                continue;
            }
            n_valid += 1;
            let w = 1.0 / s;
            let (cols, vals) = acc.design().row(r);
            let me = raw[r] * w;
            let mg = mitigated[r] * w;
            for (&j, &a) in cols.iter().zip(vals) {
                let a_w = a.conj() * w;
                rhs_raw[j] += a_w * me;
                rhs_mitigated[j] += a_w * mg;
                for (&k, &b) in cols.iter().zip(vals) {
                    info[(j, k)] += a_w * b * w;
                }
            }
        }

        tracing::debug!(
            lag = li,
            rejected,
            "{}/{} measurements good",
            n_valid,
            n_total
        );
        if n_valid == 0 {
            return Err(LpiError::NoValidMeasurements { lag: li });
        }

        let sigma = info
            .try_inverse()
            .filter(|m| m.iter().all(|z| is_valid(*z)))
            .ok_or(LpiError::SingularMatrix { lag: li })?;

        let solution = LagSolution {
            ranges: acc.index().ranges(),
            mitigated: &sigma * &rhs_mitigated,
            raw: &sigma * &rhs_raw,
            variance: sigma.diagonal().map(|z| z.re),
            n_valid,
            n_total,
        };
        tracing::debug!(
            lag = li,
            blocks = acc.n_blocks(),
            nnz = acc.design().nnz(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "lag solved"
        );
        Ok(solution)
    }
}
