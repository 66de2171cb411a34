//! Ambiguity (design) matrices
//!
//! The lag product observed at range-gate row `i` is a superposition of the
//! per-range ACF values, each weighted by the transmit ambiguity delayed by
//! that range:
//!
//! ```text
//! A[i, j] = amb[(i - (rmin + j)) mod P]        j = 0 .. rmax - rmin
//! ```
//!
//! [`AmbiguityIndex`] fixes `P`, `rmin` and `rmax` for one lag group and is
//! computed once; [`AmbiguityIndex::gather`] then turns every pulse's
//! decimated ambiguity into a sparse row block.

use std::ops::Range;

use nalgebra::DMatrix;

use crate::sparse::SparseBlock;
use crate::types::{IQSample, LpiError, LpiResult, ZERO_SAMPLE};

/// Circular-shift index table of one lag group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguityIndex {
    period: usize,
    rmin: usize,
    rmax: usize,
}

impl AmbiguityIndex {
    /// Index table with circular period `period` for ranges `[rmin, rmax)`.
    pub fn new(period: usize, rmin: usize, rmax: usize) -> Self {
        Self {
            period: period.max(1),
            rmin,
            rmax: rmax.max(rmin),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn ranges(&self) -> Range<usize> {
        self.rmin..self.rmax
    }

    /// Number of columns (estimated ranges).
    pub fn n_cols(&self) -> usize {
        self.rmax - self.rmin
    }

    /// Envelope index feeding `A[i, j]`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        let p = self.period as i64;
        (i as i64 - (self.rmin + j) as i64).rem_euclid(p) as usize
    }

    /// Sparse block holding rows `rows` of the design matrix built from
    /// `ambiguity`. Exact zeros are not stored.
    pub fn gather(&self, ambiguity: &[IQSample], rows: Range<usize>) -> LpiResult<SparseBlock> {
        if ambiguity.len() < self.period {
            return Err(LpiError::ShapeMismatch {
                expected: self.period,
                actual: ambiguity.len(),
            });
        }

        let support: Vec<(usize, IQSample)> = ambiguity[..self.period]
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| *v != ZERO_SAMPLE)
            .collect();

        let p = self.period as i64;
        let n_cols = self.n_cols();
        let mut block = SparseBlock::new(n_cols);
        let mut entries: Vec<(usize, IQSample)> = Vec::with_capacity(support.len());

        for i in rows {
            entries.clear();
            for &(k, v) in &support {
                // All j with (i - rmin - j) = k (mod P)
                let mut j = (i as i64 - self.rmin as i64 - k as i64).rem_euclid(p) as usize;
                while j < n_cols {
                    entries.push((j, v));
                    j += self.period;
                }
            }
            entries.sort_by_key(|&(j, _)| j);
            block.push_row(entries.iter().copied());
        }
        Ok(block)
    }
}

/// Dense matrix `A[i, j] = envelope[(i - (rmin + j)) mod len(envelope)]` of
/// shape `len(envelope) x (rmax - rmin)`.
pub fn build(envelope: &[IQSample], rmin: usize, rmax: usize) -> DMatrix<IQSample> {
    let index = AmbiguityIndex::new(envelope.len(), rmin, rmax);
    if envelope.is_empty() {
        return DMatrix::from_element(0, index.n_cols(), ZERO_SAMPLE);
    }
    DMatrix::from_fn(envelope.len(), index.n_cols(), |i, j| envelope[index.index(i, j)])
}
