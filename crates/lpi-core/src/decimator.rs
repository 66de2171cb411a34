//! Block-averaging decimator
//!
//! Maps a sample-rate lag-product sequence to range-gate resolution. Each
//! output sample is the mean of `ratio` consecutive inputs; a trailing
//! partial block is dropped. Unlike a streaming boxcar decimator there is no
//! state between calls: every lag product starts at sample zero.
//!
//! ## Example
//!
//! ```rust
//! use lpi_core::decimator::Decimator;
//! use num_complex::Complex64;
//!
//! let decim = Decimator::new(100, 10);
//! let input = vec![Complex64::new(2.0, -1.0); 95];
//! let out = decim.decimate(&input);
//! assert_eq!(out.len(), 9);
//! assert_eq!(out[0], Complex64::new(2.0, -1.0));
//! ```

use std::ops::Range;

use crate::types::{IQBuffer, IQSample};

/// Fixed-ratio block-averaging decimator.
#[derive(Debug, Clone)]
pub struct Decimator {
    ratio: usize,
    /// Input index range averaged into each output sample.
    groups: Vec<Range<usize>>,
}

impl Decimator {
    /// Create a decimator for inputs of up to `len` samples.
    pub fn new(len: usize, ratio: usize) -> Self {
        let ratio = ratio.max(1);
        let groups = (0..len / ratio)
            .map(|i| i * ratio..(i + 1) * ratio)
            .collect();
        Self { ratio, groups }
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Output length for an input of `len` samples.
    pub fn output_len(&self, len: usize) -> usize {
        (len / self.ratio).min(self.groups.len())
    }

    /// Block means of `z`. NaN inside a block makes that output NaN.
    pub fn decimate(&self, z: &[IQSample]) -> IQBuffer {
        let scale = 1.0 / self.ratio as f64;
        self.groups[..self.output_len(z.len())]
            .iter()
            .map(|group| z[group.clone()].iter().sum::<IQSample>() * scale)
            .collect()
    }
}
