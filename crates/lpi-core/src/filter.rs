//! Low-pass filter: FFT-domain windowed-sinc FIR
//!
//! Suppresses out-of-band interference and isolates the injected
//! calibration noise band. The whole echo is filtered as one block:
//! forward FFT, multiplication by the precomputed filter transform, inverse
//! FFT and a circular shift by `-L` that removes the group delay of the
//! `2L`-tap impulse response.
//!
//! ```text
//! h[k] = hann(2L)[k] * sin(om0 * m) / (pi * m),   m = k - L,  k = 0 .. 2L-1
//! om0  = pi * f0 / (fs / 2)
//! ```
//!
//! NaN inputs spread over the whole output; callers zero invalid samples
//! before filtering and mark them NaN afterwards.

use std::f64::consts::PI;

use crate::config::{FilterConfig, FilterNormalization};
use crate::fft_utils::FftProcessor;
use crate::types::{IQBuffer, IQSample, LpiError, LpiResult};

/// Symmetric Hann window, `0.5 * (1 - cos(2 pi n / (N - 1)))`.
pub fn hann_window(length: usize) -> Vec<f64> {
    if length == 0 {
        return vec![];
    }
    if length == 1 {
        return vec![1.0];
    }

    let n_minus_1 = (length - 1) as f64;
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / n_minus_1).cos()))
        .collect()
}

/// Hann-windowed sinc impulse response of length `2 * half_length`.
pub fn windowed_sinc(
    sample_rate: f64,
    cutoff: f64,
    half_length: usize,
    normalization: FilterNormalization,
) -> Vec<f64> {
    let om0 = PI * cutoff / (0.5 * sample_rate);
    let window = hann_window(2 * half_length);

    let mut h: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(k, w)| {
            let m = k as f64 - half_length as f64;
            let sinc = if m == 0.0 { om0 / PI } else { (om0 * m).sin() / (PI * m) };
            w * sinc
        })
        .collect();

    let norm = match normalization {
        FilterNormalization::UnitEnergy => h.iter().map(|x| x * x).sum::<f64>().sqrt(),
        FilterNormalization::UnitDcGain => h.iter().sum::<f64>(),
    };
    if norm != 0.0 {
        for x in h.iter_mut() {
            *x /= norm;
        }
    }
    h
}

/// FFT-domain low-pass filter for fixed-length sequences.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    /// Transform of the impulse response padded to the sequence length.
    response: IQBuffer,
    half_length: usize,
    fft: FftProcessor,
}

impl LowPassFilter {
    /// Build a filter for sequences of length `len`.
    pub fn new(
        len: usize,
        sample_rate: f64,
        cutoff: f64,
        half_length: usize,
        normalization: FilterNormalization,
    ) -> Self {
        let fft = FftProcessor::new(len);
        let taps: IQBuffer = windowed_sinc(sample_rate, cutoff, half_length, normalization)
            .into_iter()
            .map(|x| IQSample::new(x, 0.0))
            .collect();
        let response = fft.fft_padded(&taps);

        Self {
            response,
            half_length,
            fft,
        }
    }

    /// Build the engine's echo filter from configuration.
    pub fn from_config(config: &FilterConfig, len: usize, sample_rate: f64) -> Self {
        Self::new(
            len,
            sample_rate,
            config.cutoff(),
            config.half_length,
            config.normalization,
        )
    }

    /// Sequence length this filter was planned for.
    pub fn len(&self) -> usize {
        self.fft.size()
    }

    pub fn is_empty(&self) -> bool {
        self.fft.size() == 0
    }

    pub fn half_length(&self) -> usize {
        self.half_length
    }

    /// Filter one sequence, returning a new buffer.
    pub fn apply(&self, z: &[IQSample]) -> LpiResult<IQBuffer> {
        let n = self.len();
        if z.len() != n {
            return Err(LpiError::ShapeMismatch {
                expected: n,
                actual: z.len(),
            });
        }

        let mut spectrum = z.to_vec();
        self.fft.fft_inplace(&mut spectrum);
        for (s, h) in spectrum.iter_mut().zip(self.response.iter()) {
            *s *= h;
        }
        self.fft.ifft_inplace(&mut spectrum);

        // Undo the group delay of the centered impulse response
        spectrum.rotate_left(self.half_length % n.max(1));
        Ok(spectrum)
    }
}
