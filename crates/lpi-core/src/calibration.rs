//! Noise injection calibration.
//!
//! Every pulse carries a quiet background window at the end of the echo and a
//! window with calibrated noise injected on top of the background. The
//! medians over an integration period give the receiver noise power and the
//! power-to-temperature scale:
//!
//! ```text
//! noise = median(background)
//! alpha = (median(background + injection) - noise) / T_injection
//! T_sys = noise / alpha
//! ```

use crate::stats::nan_median;
use crate::types::IQSample;

/// Per-pulse calibration powers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    /// Mean background power around the local DC
    pub background: f64,
    /// Mean power of the injection window around the local DC
    pub background_plus_injection: f64,
    /// Local DC level of the background window
    pub dc: IQSample,
}

/// Calibration scalars of one integration period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Median background power
    pub noise: f64,
    /// Power per kelvin
    pub alpha: f64,
    /// System temperature (K)
    pub system_temperature: f64,
    /// Componentwise median of the local DC levels
    pub dc_offset: IQSample,
}

/// Collects calibration samples over a period.
#[derive(Debug, Clone)]
pub struct CalibrationAccumulator {
    injection_temperature: f64,
    samples: Vec<CalibrationSample>,
}

impl CalibrationAccumulator {
    pub fn new(injection_temperature: f64) -> Self {
        Self {
            injection_temperature,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: CalibrationSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reduce the collected samples. Degenerate inputs give NaN or infinite
    /// values rather than an error.
    pub fn finish(&self) -> Calibration {
        let noise = nan_median(self.samples.iter().map(|s| s.background));
        let with_injection = nan_median(self.samples.iter().map(|s| s.background_plus_injection));
        let alpha = (with_injection - noise) / self.injection_temperature;
        let dc_offset = IQSample::new(
            nan_median(self.samples.iter().map(|s| s.dc.re)),
            nan_median(self.samples.iter().map(|s| s.dc.im)),
        );

        Calibration {
            noise,
            alpha,
            system_temperature: noise / alpha,
            dc_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(background: f64, injected: f64) -> CalibrationSample {
        CalibrationSample {
            background,
            background_plus_injection: background + injected,
            dc: IQSample::new(background * 0.01, -0.5),
        }
    }

    #[test]
    fn test_system_temperature() {
        let t_inj = 1172.0;
        let noise = 3.0;
        let alpha = 0.002;
        let mut acc = CalibrationAccumulator::new(t_inj);
        for _ in 0..11 {
            acc.push(sample(noise, alpha * t_inj));
        }

        let cal = acc.finish();
        assert_relative_eq!(cal.noise, noise, epsilon = 1e-12);
        assert_relative_eq!(cal.alpha, alpha, epsilon = 1e-12);
        assert_relative_eq!(cal.system_temperature, noise / alpha, max_relative = 1e-9);
        assert_relative_eq!(cal.dc_offset.im, -0.5);
    }

    #[test]
    fn test_medians_reject_outlier_pulses() {
        let mut acc = CalibrationAccumulator::new(100.0);
        for _ in 0..5 {
            acc.push(sample(1.0, 1.0));
        }
        acc.push(sample(1e6, 1e6));
        acc.push(sample(1e6, 1e6));

        let cal = acc.finish();
        assert_relative_eq!(cal.noise, 1.0);
        assert_relative_eq!(cal.alpha, 0.01, max_relative = 1e-12);
        assert_relative_eq!(cal.system_temperature, 100.0, max_relative = 1e-12);
    }

    #[test]
    fn test_no_injection_is_unguarded() {
        let mut acc = CalibrationAccumulator::new(1172.0);
        acc.push(sample(2.0, 0.0));
        let cal = acc.finish();
        assert_eq!(cal.alpha, 0.0);
        assert!(cal.system_temperature.is_infinite());

        assert!(CalibrationAccumulator::new(1172.0).finish().noise.is_nan());
    }
}
