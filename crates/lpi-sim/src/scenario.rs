//! Synthetic radar scenario
//!
//! Pulses are transmitted every `ipp` samples on the metadata clock. Each
//! echo vector holds:
//!
//! - the transmit pulse leaking into the receiver at `tx_window`, a
//!   binary phase code derived from the pulse code id
//! - one delayed copy of the pulse per point target, scaled by the target
//!   amplitude and rotated by its Doppler phase
//! - optional receiver noise everywhere and injected calibration noise in a
//!   window
//! - a constant receiver DC offset
//!
//! A point target at delay `d` with amplitude `c` and Doppler `w` (rad per
//! sample) has the lag `l` autocorrelation `E |c|^2 exp(-i w l)` at range
//! gate `d / range_gate`, where `E` is the transmit pulse energy. Echoes are
//! generated on every read with noise seeded by the pulse id, so a pulse read
//! twice is identical.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ops::Range;

use lpi_core::source::{PulseMetadataSource, SampleSource};
use lpi_core::types::{CodeId, IQBuffer, IQSample, LpiError, LpiResult, PulseId};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Point scatterer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointTarget {
    /// Round-trip delay in samples
    pub delay: usize,
    /// Complex voltage reflection
    pub amplitude: IQSample,
    /// Doppler shift in radians per sample
    pub doppler: f64,
}

impl PointTarget {
    /// Expected ACF of this target at `lag` for a pulse of energy `energy`.
    pub fn acf(&self, lag: f64, energy: f64) -> IQSample {
        energy * self.amplitude.norm_sqr() * Complex64::from_polar(1.0, -self.doppler * lag)
    }
}

/// Scenario parameters.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Samples per echo vector
    pub echo_length: usize,
    /// Transmit time of the first pulse
    pub first_pulse: u64,
    /// Inter-pulse period on the metadata clock
    pub ipp: u64,
    pub n_pulses: usize,
    /// Code ids assigned to consecutive pulses, cycled
    pub codes: Vec<CodeId>,
    /// Transmit pulse position within the echo vector
    pub tx_window: Range<usize>,
    pub tx_amplitude: f64,
    /// Samples per phase-code baud
    pub baud_length: usize,
    pub targets: Vec<PointTarget>,
    /// Receiver noise power per complex sample
    pub noise_power: f64,
    /// Injected calibration noise: window and power per complex sample
    pub injection: Option<(Range<usize>, f64)>,
    pub dc_offset: IQSample,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            echo_length: 1000,
            first_pulse: 0,
            ipp: 1000,
            n_pulses: 6,
            codes: vec![1],
            tx_window: 10..60,
            tx_amplitude: 1.0,
            baud_length: 5,
            targets: Vec::new(),
            noise_power: 0.0,
            injection: None,
            dc_offset: IQSample::new(0.0, 0.0),
            seed: 42,
        }
    }
}

/// Binary phase of baud `baud` of code `code`.
fn code_phase(code: CodeId, baud: usize) -> f64 {
    let h = (code as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((baud as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    if (h >> 33) & 1 == 1 {
        PI
    } else {
        0.0
    }
}

/// In-memory sample and metadata source.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    config: ScenarioConfig,
    schedule: BTreeMap<PulseId, CodeId>,
}

impl SyntheticScenario {
    pub fn new(config: ScenarioConfig) -> Self {
        let schedule = (0..config.n_pulses)
            .map(|k| {
                let code = config.codes[k % config.codes.len().max(1)];
                (config.first_pulse + k as u64 * config.ipp, code)
            })
            .collect();
        tracing::debug!(pulses = config.n_pulses, targets = config.targets.len(), "synthetic scenario");
        Self { config, schedule }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Noiseless transmit waveform of `code` over the whole echo vector.
    pub fn transmit_waveform(&self, code: CodeId) -> IQBuffer {
        let window = &self.config.tx_window;
        let baud = self.config.baud_length.max(1);
        (0..self.config.echo_length)
            .map(|t| {
                if window.contains(&t) {
                    let phase = code_phase(code, (t - window.start) / baud);
                    Complex64::from_polar(self.config.tx_amplitude, phase)
                } else {
                    IQSample::new(0.0, 0.0)
                }
            })
            .collect()
    }

    /// Transmit pulse energy.
    pub fn transmit_energy(&self) -> f64 {
        self.config.tx_window.len() as f64 * self.config.tx_amplitude.powi(2)
    }

    fn echo(&self, pulse: PulseId, code: CodeId) -> IQBuffer {
        let n = self.config.echo_length;
        let tx = self.transmit_waveform(code);
        let mut z = tx.clone();

        for target in &self.config.targets {
            for (t, x) in tx.iter().enumerate() {
                let Some(out) = z.get_mut(t + target.delay) else {
                    break;
                };
                let rotation = Complex64::from_polar(1.0, target.doppler * (t + target.delay) as f64);
                *out += target.amplitude * x * rotation;
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed ^ pulse.rotate_left(17));
        if self.config.noise_power > 0.0 {
            add_noise(&mut z[..], self.config.noise_power, &mut rng);
        }
        if let Some((window, power)) = &self.config.injection {
            let window = window.start.min(n)..window.end.min(n);
            add_noise(&mut z[window], *power, &mut rng);
        }

        for x in z.iter_mut() {
            *x += self.config.dc_offset;
        }
        z
    }
}

/// Add circular complex Gaussian noise of the given power.
fn add_noise(z: &mut [IQSample], power: f64, rng: &mut StdRng) {
    let std = (power / 2.0).sqrt();
    let Ok(normal) = Normal::new(0.0, std) else {
        return;
    };
    for x in z.iter_mut() {
        *x += Complex64::new(normal.sample(rng), normal.sample(rng));
    }
}

impl SampleSource for SyntheticScenario {
    fn read_echo(&self, pulse: PulseId, len: usize, _channel: &str) -> LpiResult<IQBuffer> {
        let code = *self
            .schedule
            .get(&pulse)
            .ok_or_else(|| LpiError::Source(format!("no pulse transmitted at {}", pulse)))?;
        if len > self.config.echo_length {
            return Err(LpiError::Source(format!(
                "requested {} samples, echoes hold {}",
                len, self.config.echo_length
            )));
        }
        let mut z = self.echo(pulse, code);
        z.truncate(len);
        Ok(z)
    }
}

impl PulseMetadataSource for SyntheticScenario {
    fn time_bounds(&self) -> LpiResult<(u64, u64)> {
        let start = self.config.first_pulse;
        Ok((start, start + self.config.n_pulses as u64 * self.config.ipp))
    }

    fn pulse_codes(&self, start: u64, end: u64) -> LpiResult<BTreeMap<PulseId, CodeId>> {
        Ok(self
            .schedule
            .range(start..end)
            .map(|(&pulse, &code)| (pulse, code))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_schedule_and_bounds() {
        let scenario = SyntheticScenario::new(ScenarioConfig {
            n_pulses: 5,
            codes: vec![3, 3, 4, 4],
            first_pulse: 2000,
            ..Default::default()
        });
        assert_eq!(scenario.time_bounds().unwrap(), (2000, 7000));
        let codes = scenario.pulse_codes(3000, 6000).unwrap();
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec![(3000, 3), (4000, 4), (5000, 4)]);
    }

    #[test]
    fn test_transmit_waveform() {
        let scenario = SyntheticScenario::new(ScenarioConfig::default());
        let tx = scenario.transmit_waveform(1);
        assert_eq!(tx[9], IQSample::new(0.0, 0.0));
        assert_eq!(tx[60], IQSample::new(0.0, 0.0));
        assert_relative_eq!(tx[10].norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            tx.iter().map(|x| x.norm_sqr()).sum::<f64>(),
            scenario.transmit_energy(),
            epsilon = 1e-9
        );
        // Codes differ
        assert_ne!(scenario.transmit_waveform(2), tx);
    }

    #[test]
    fn test_target_echo_position() {
        let target = PointTarget {
            delay: 300,
            amplitude: IQSample::new(0.5, 0.0),
            doppler: 0.0,
        };
        let scenario = SyntheticScenario::new(ScenarioConfig {
            targets: vec![target],
            ..Default::default()
        });
        let z = scenario.read_echo(0, 1000, "test").unwrap();
        let tx = scenario.transmit_waveform(1);
        assert_eq!(z[309], IQSample::new(0.0, 0.0));
        assert_relative_eq!((z[310] - tx[10] * 0.5).norm(), 0.0, epsilon = 1e-12);
        assert_eq!(z[360], IQSample::new(0.0, 0.0));
    }

    #[test]
    fn test_noise_reproducible_per_pulse() {
        let scenario = SyntheticScenario::new(ScenarioConfig {
            noise_power: 2.0,
            ..Default::default()
        });
        let a = scenario.read_echo(1000, 1000, "test").unwrap();
        let b = scenario.read_echo(1000, 1000, "test").unwrap();
        let c = scenario.read_echo(2000, 1000, "test").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let power = a[100..].iter().map(|x| x.norm_sqr()).sum::<f64>() / 900.0;
        assert_relative_eq!(power, 2.0, max_relative = 0.2);
    }

    #[test]
    fn test_unknown_pulse_and_long_read() {
        let scenario = SyntheticScenario::new(ScenarioConfig::default());
        assert!(matches!(scenario.read_echo(1, 10, "x"), Err(LpiError::Source(_))));
        assert!(scenario.read_echo(0, 1001, "x").is_err());
        assert_eq!(scenario.read_echo(0, 100, "x").unwrap().len(), 100);
    }

    #[test]
    fn test_target_acf() {
        let target = PointTarget {
            delay: 0,
            amplitude: IQSample::new(0.0, 2.0),
            doppler: 0.1,
        };
        let acf = target.acf(5.0, 50.0);
        assert_relative_eq!(acf.norm(), 200.0, epsilon = 1e-9);
        assert_relative_eq!(acf.arg(), -0.5, epsilon = 1e-12);
    }
}
