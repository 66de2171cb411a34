//! Per-pulse preprocessing
//!
//! Turns one transmitted pulse into everything the per-lag inversion needs:
//!
//! ```text
//! read echo, subtract DC ──┬── transmit window, unit energy ─────────── ambiguity lag products
//!                          ├── filtered copy ──── calibration powers
//!                          └── clutter window ── filter ──┬─────────── raw lag products
//! read partner, subtract DC ─ clutter window ── filter ──┴─ difference ─ mitigated lag products
//! ```
//!
//! Ground clutter is removed by subtracting the echo of a partner pulse
//! transmitted with the same code shortly before or after: the clutter is
//! nearly identical in both and cancels, while the ionospheric echo
//! decorrelates between pulses. Every masking step returns a new buffer.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::calibration::CalibrationSample;
use crate::config::{LpiConfig, PulseCodeTiming};
use crate::decimator::Decimator;
use crate::filter::LowPassFilter;
use crate::lags::LagPlan;
use crate::source::SampleSource;
use crate::types::complex_ops::{energy, lag_product, mean, mean_power_about};
use crate::types::{
    CodeId, IQBuffer, IQSample, LpiError, LpiResult, PulseId, NAN_SAMPLE, ZERO_SAMPLE,
};

/// Pulses of one integration period in transmit order.
pub type PulseSequence = Vec<(PulseId, CodeId)>;

/// Clutter reference relationship of a pulse within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseRole {
    /// Long uncoded pulse, referenced against a later long pulse
    LongPulse { partner: usize },
    /// First of an alternating code pair, referenced against the next pulse
    FirstOfPair { partner: usize },
    /// Second of an alternating code pair, referenced against the previous pulse
    SecondOfPair { partner: usize },
}

impl PulseRole {
    /// Determine the role of pulse `k`.
    pub fn classify(
        sequence: &[(PulseId, CodeId)],
        k: usize,
        timing: &PulseCodeTiming,
        long_pulse_stride: usize,
    ) -> LpiResult<Self> {
        let (pulse, code) = sequence[k];
        let unhandled = || LpiError::UnhandledPulseSequence { pulse, code };

        if timing.long_pulse {
            let partner = k + long_pulse_stride;
            return if partner < sequence.len() {
                Ok(PulseRole::LongPulse { partner })
            } else {
                Err(unhandled())
            };
        }
        if sequence.get(k + 1).is_some_and(|&(_, c)| c == code) {
            return Ok(PulseRole::FirstOfPair { partner: k + 1 });
        }
        if k > 0 && sequence[k - 1].1 == code {
            return Ok(PulseRole::SecondOfPair { partner: k - 1 });
        }
        Err(unhandled())
    }

    /// Sequence index of the clutter reference pulse.
    pub fn partner(&self) -> usize {
        match *self {
            PulseRole::LongPulse { partner }
            | PulseRole::FirstOfPair { partner }
            | PulseRole::SecondOfPair { partner } => partner,
        }
    }
}

/// DC-corrected echoes of a pulse and its clutter reference.
#[derive(Debug, Clone)]
pub struct PulseRecord {
    pub pulse: PulseId,
    pub code: CodeId,
    pub role: PulseRole,
    pub echo: IQBuffer,
    pub reference: IQBuffer,
}

/// Decimated lag products of one lag of one pulse.
#[derive(Debug, Clone)]
pub struct LagProductSet {
    pub lag: usize,
    /// Transmit ambiguity, full length
    pub ambiguity: IQBuffer,
    /// Clutter-mitigated products, measurement rows only
    pub mitigated: IQBuffer,
    /// Raw products, measurement rows only
    pub raw: IQBuffer,
}

/// Output of [`PulsePreprocessor::process`].
#[derive(Debug, Clone)]
pub struct PulseProducts {
    pub pulse: PulseId,
    pub code: CodeId,
    pub role: PulseRole,
    pub calibration: CalibrationSample,
    /// Indexed `[lag group][lag within group]`
    pub lags: Vec<Vec<LagProductSet>>,
}

/// Copy of `z` with everything outside `window` replaced by `fill`.
pub fn keep_window(z: &[IQSample], window: Range<usize>, fill: IQSample) -> IQBuffer {
    z.iter()
        .enumerate()
        .map(|(t, &x)| if window.contains(&t) { x } else { fill })
        .collect()
}

/// Transmit waveform cut from the echo and scaled to unit energy.
/// `None` if the transmit window holds no energy.
pub fn transmit_waveform(echo: &[IQSample], timing: &PulseCodeTiming) -> Option<IQBuffer> {
    let tx = keep_window(echo, timing.tx_start..timing.tx_end, ZERO_SAMPLE);
    let e = energy(&tx);
    if !(e.is_finite() && e > 0.0) {
        return None;
    }
    let scale = 1.0 / e.sqrt();
    Some(tx.into_iter().map(|x| x * scale).collect())
}

/// Per-pulse preprocessing stage.
#[derive(Debug, Clone)]
pub struct PulsePreprocessor {
    channel: String,
    echo_length: usize,
    codes: BTreeMap<CodeId, PulseCodeTiming>,
    use_long_pulse: bool,
    long_pulse_stride: usize,
    background_window: usize,
    dc: IQSample,
    filter: Option<LowPassFilter>,
    decimator: Decimator,
    plan: LagPlan,
}

impl PulsePreprocessor {
    /// Build the stage for a validated configuration and global DC offset.
    pub fn new(config: &LpiConfig, plan: LagPlan, dc: IQSample) -> Self {
        let filter = config.filter.enabled.then(|| {
            LowPassFilter::from_config(&config.filter, config.echo_length, config.sample_rate)
        });
        Self {
            channel: config.channel.clone(),
            echo_length: config.echo_length,
            codes: config.codes.clone(),
            use_long_pulse: config.clutter.use_long_pulse,
            long_pulse_stride: config.clutter.long_pulse_stride,
            background_window: config.calibration.background_window,
            dc,
            filter,
            decimator: Decimator::new(config.echo_length, config.range_gate),
            plan,
        }
    }

    pub fn plan(&self) -> &LagPlan {
        &self.plan
    }

    pub fn dc_offset(&self) -> IQSample {
        self.dc
    }

    /// Filter half length in samples, zero when filtering is disabled.
    pub fn filter_half_length(&self) -> usize {
        self.filter.as_ref().map_or(0, LowPassFilter::half_length)
    }

    fn filtered(&self, z: IQBuffer) -> LpiResult<IQBuffer> {
        match &self.filter {
            Some(filter) => filter.apply(&z),
            None => Ok(z),
        }
    }

    fn read(&self, source: &impl SampleSource, pulse: PulseId) -> LpiResult<IQBuffer> {
        let z = source.read_echo(pulse, self.echo_length, &self.channel)?;
        if z.len() != self.echo_length {
            return Err(LpiError::ShapeMismatch {
                expected: self.echo_length,
                actual: z.len(),
            });
        }
        Ok(z.into_iter().map(|x| x - self.dc).collect())
    }

    /// Timing of pulse `k`, or an unknown-code error.
    pub fn timing(&self, sequence: &[(PulseId, CodeId)], k: usize) -> LpiResult<&PulseCodeTiming> {
        let (pulse, code) = sequence[k];
        self.codes
            .get(&code)
            .ok_or(LpiError::UnknownPulseCode { pulse, code })
    }

    /// Read pulse `k` and its clutter reference. `None` for a long pulse
    /// that is configured out.
    pub fn read_record(
        &self,
        source: &impl SampleSource,
        sequence: &[(PulseId, CodeId)],
        k: usize,
    ) -> LpiResult<Option<PulseRecord>> {
        let (pulse, code) = sequence[k];
        let timing = self.timing(sequence, k)?;
        if timing.long_pulse && !self.use_long_pulse {
            tracing::trace!(pulse, "skipping long pulse");
            return Ok(None);
        }

        let role = PulseRole::classify(sequence, k, timing, self.long_pulse_stride)?;
        let echo = self.read(source, pulse)?;
        let reference = self.read(source, sequence[role.partner()].0)?;
        Ok(Some(PulseRecord {
            pulse,
            code,
            role,
            echo,
            reference,
        }))
    }

    /// Background and injection powers of one echo.
    pub fn calibration_sample(
        &self,
        echo: &[IQSample],
        timing: &PulseCodeTiming,
    ) -> LpiResult<CalibrationSample> {
        let needed = timing.last_echo.max(timing.noise_end);
        if echo.len() < needed {
            return Err(LpiError::ShapeMismatch {
                expected: needed,
                actual: echo.len(),
            });
        }
        let z = self.filtered(echo.to_vec())?;
        let background = &z[timing.last_echo - self.background_window..timing.last_echo];
        let dc = mean(background);
        Ok(CalibrationSample {
            background: mean_power_about(background, dc),
            background_plus_injection: mean_power_about(&z[timing.noise_start..timing.noise_end], dc),
            dc,
        })
    }

    /// Decimated lag product of `z`, restricted to `rows` when given.
    fn decimated_product(
        &self,
        z: &[IQSample],
        lag: usize,
        rows: Option<Range<usize>>,
    ) -> LpiResult<IQBuffer> {
        let full = self.decimator.decimate(&lag_product(z, lag));
        match rows {
            None => Ok(full),
            Some(rows) => full.get(rows.clone()).map(<[IQSample]>::to_vec).ok_or(
                LpiError::ShapeMismatch {
                    expected: rows.end,
                    actual: full.len(),
                },
            ),
        }
    }

    /// Filtered echo and echo minus reference, NaN outside
    /// `[ground_clutter_end, last_echo)`.
    pub fn clutter_window(
        &self,
        record: &PulseRecord,
        timing: &PulseCodeTiming,
    ) -> LpiResult<(IQBuffer, IQBuffer)> {
        let window = timing.ground_clutter_end..timing.last_echo;
        let echo = self.filtered(keep_window(&record.echo, window.clone(), ZERO_SAMPLE))?;
        let reference = self.filtered(keep_window(&record.reference, window.clone(), ZERO_SAMPLE))?;
        let difference: IQBuffer = echo.iter().zip(&reference).map(|(e, r)| e - r).collect();

        Ok((
            keep_window(&echo, window.clone(), NAN_SAMPLE),
            keep_window(&difference, window, NAN_SAMPLE),
        ))
    }

    /// Lag products and calibration powers of an already read pulse.
    pub fn products(&self, record: PulseRecord) -> LpiResult<Option<PulseProducts>> {
        let timing = self
            .codes
            .get(&record.code)
            .ok_or(LpiError::UnknownPulseCode {
                pulse: record.pulse,
                code: record.code,
            })?;

        let Some(tx) = transmit_waveform(&record.echo, timing) else {
            tracing::warn!(pulse = record.pulse, "no transmit energy, skipping pulse");
            return Ok(None);
        };
        let calibration = self.calibration_sample(&record.echo, timing)?;
        let (echo, difference) = self.clutter_window(&record, timing)?;

        let rows = self.plan.rows();
        let mut lags = Vec::with_capacity(self.plan.n_lags());
        for li in 0..self.plan.n_lags() {
            let group = self
                .plan
                .group(li)
                .iter()
                .map(|&lag| {
                    Ok(LagProductSet {
                        lag,
                        ambiguity: self.decimated_product(&tx, lag, None)?,
                        mitigated: self.decimated_product(&difference, lag, Some(rows.clone()))?,
                        raw: self.decimated_product(&echo, lag, Some(rows.clone()))?,
                    })
                })
                .collect::<LpiResult<Vec<_>>>()?;
            lags.push(group);
        }

        Ok(Some(PulseProducts {
            pulse: record.pulse,
            code: record.code,
            role: record.role,
            calibration,
            lags,
        }))
    }

    /// Full preprocessing of pulse `k` of `sequence`.
    pub fn process(
        &self,
        source: &impl SampleSource,
        sequence: &[(PulseId, CodeId)],
        k: usize,
    ) -> LpiResult<Option<PulseProducts>> {
        match self.read_record(source, sequence, k)? {
            Some(record) => self.products(record),
            None => Ok(None),
        }
    }
}
