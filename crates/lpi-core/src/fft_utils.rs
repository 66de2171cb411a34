//! FFT utilities
//!
//! Thin wrapper around `rustfft` plans of a fixed size. Transforms run
//! through `&self` so a planned processor can be shared by every pulse of
//! an integration period.

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// Forward and inverse FFT plans of one size.
#[derive(Clone)]
pub struct FftProcessor {
    size: usize,
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .finish()
    }
}

impl FftProcessor {
    /// Create a new FFT processor for the given size
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let fft_inverse = planner.plan_fft_inverse(size);

        Self {
            size,
            fft_forward,
            fft_inverse,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward FFT in place. `buffer.len()` must equal the plan size.
    pub fn fft_inplace(&self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_forward.process(buffer);
    }

    /// Inverse FFT in place, normalized by `1/N`.
    pub fn ifft_inplace(&self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_inverse.process(buffer);

        let scale = 1.0 / self.size as f64;
        for sample in buffer.iter_mut() {
            *sample *= scale;
        }
    }

    /// Forward FFT of `input` zero-padded or truncated to the plan size.
    pub fn fft_padded(&self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input.iter().take(self.size).copied().collect();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.fft_inplace(&mut buffer);
        buffer
    }
}
