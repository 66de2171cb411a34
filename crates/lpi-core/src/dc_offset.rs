//! Receiver DC bias estimation.
//!
//! The digitizer adds a small constant bias to every sample. It is estimated
//! from the quiet part of a few early echoes: samples well past the ground
//! clutter and before the end of the usable echo. Outside that window every
//! pulse is masked with NaN, the pulses are averaged sample by sample and the
//! real and imaginary parts of the average take separate medians.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::config::PulseCodeTiming;
use crate::stats::nan_median;
use crate::types::{CodeId, IQSample, LpiError, LpiResult, NAN_SAMPLE, ZERO_SAMPLE};

/// Minimum number of echoes accepted by [`DcOffsetEstimator::estimate`].
pub const MIN_DC_PULSES: usize = 3;

/// Median-based DC bias estimator.
#[derive(Debug, Clone, Copy)]
pub struct DcOffsetEstimator {
    quiet_offset: usize,
}

impl DcOffsetEstimator {
    /// Quiet samples start `quiet_offset` past the ground clutter end.
    pub fn new(quiet_offset: usize) -> Self {
        Self { quiet_offset }
    }

    /// Quiet sample window of a code for echoes of length `n`.
    pub fn quiet_window(&self, timing: &PulseCodeTiming, n: usize) -> Range<usize> {
        let end = timing.last_echo.min(n);
        let start = (timing.ground_clutter_end + self.quiet_offset).min(end);
        start..end
    }

    /// Estimate the bias from `(code, echo)` pairs of equal length.
    ///
    /// Echoes with a code missing from `codes` are skipped with a warning.
    pub fn estimate(
        &self,
        codes: &BTreeMap<CodeId, PulseCodeTiming>,
        echoes: &[(CodeId, Vec<IQSample>)],
    ) -> LpiResult<IQSample> {
        let n = echoes.first().map(|(_, z)| z.len()).unwrap_or(0);
        let mut sum = vec![ZERO_SAMPLE; n];
        let mut used = 0usize;

        for (code, echo) in echoes {
            let Some(timing) = codes.get(code) else {
                tracing::warn!(code, "DC estimate: skipping pulse with unknown code");
                continue;
            };
            if echo.len() != n {
                return Err(LpiError::ShapeMismatch {
                    expected: n,
                    actual: echo.len(),
                });
            }
            let quiet = self.quiet_window(timing, n);
            for (t, (acc, z)) in sum.iter_mut().zip(echo).enumerate() {
                *acc += if quiet.contains(&t) { *z } else { NAN_SAMPLE };
            }
            used += 1;
        }

        if used < MIN_DC_PULSES {
            return Err(LpiError::InsufficientPulses {
                needed: MIN_DC_PULSES,
                actual: used,
            });
        }

        let scale = 1.0 / used as f64;
        let re = nan_median(sum.iter().map(|z| z.re * scale));
        let im = nan_median(sum.iter().map(|z| z.im * scale));
        tracing::debug!(re, im, pulses = used, "estimated DC offset");
        Ok(IQSample::new(re, im))
    }
}
