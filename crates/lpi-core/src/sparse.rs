//! Block-sparse design matrices
//!
//! Every pulse contributes one block of rows to the design matrix of each
//! lag. Blocks are kept in compressed-row form and stacked lazily: the
//! stacked matrix is never materialized, rows are addressed through
//! `(block, local row)` instead.

use nalgebra::DMatrix;

use crate::types::{IQSample, LpiError, LpiResult, ZERO_SAMPLE};

/// One compressed-sparse-row block.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBlock {
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<IQSample>,
}

impl SparseBlock {
    /// Empty block with `n_cols` columns and no rows.
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            row_ptr: vec![0],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append a row from `(column, value)` pairs sorted by column.
    pub fn push_row(&mut self, entries: impl IntoIterator<Item = (usize, IQSample)>) {
        for (col, value) in entries {
            debug_assert!(col < self.n_cols);
            self.col_idx.push(col);
            self.values.push(value);
        }
        self.row_ptr.push(self.col_idx.len());
    }

    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[IQSample]) {
        let span = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[span.clone()], &self.values[span])
    }

    pub fn to_dense(&self) -> DMatrix<IQSample> {
        let mut dense = DMatrix::from_element(self.n_rows(), self.n_cols, ZERO_SAMPLE);
        for i in 0..self.n_rows() {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                dense[(i, j)] = v;
            }
        }
        dense
    }
}

/// Vertical stack of equally shaped blocks, one per pulse and lag.
#[derive(Debug, Clone)]
pub struct StackedDesign {
    n_cols: usize,
    block_rows: usize,
    blocks: Vec<SparseBlock>,
}

impl StackedDesign {
    pub fn new(block_rows: usize, n_cols: usize) -> Self {
        Self {
            n_cols,
            block_rows,
            blocks: Vec::new(),
        }
    }

    /// Append a block; its shape must match the stack.
    pub fn push(&mut self, block: SparseBlock) -> LpiResult<()> {
        if block.n_cols() != self.n_cols {
            return Err(LpiError::ShapeMismatch {
                expected: self.n_cols,
                actual: block.n_cols(),
            });
        }
        if block.n_rows() != self.block_rows {
            return Err(LpiError::ShapeMismatch {
                expected: self.block_rows,
                actual: block.n_rows(),
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_rows(&self) -> usize {
        self.block_rows
    }

    pub fn n_rows(&self) -> usize {
        self.blocks.len() * self.block_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.blocks.iter().map(SparseBlock::nnz).sum()
    }

    /// Row `r` of the stacked matrix.
    pub fn row(&self, r: usize) -> (&[usize], &[IQSample]) {
        self.blocks[r / self.block_rows].row(r % self.block_rows)
    }

    pub fn to_dense(&self) -> DMatrix<IQSample> {
        let mut dense = DMatrix::from_element(self.n_rows(), self.n_cols, ZERO_SAMPLE);
        for r in 0..self.n_rows() {
            let (cols, vals) = self.row(r);
            for (&j, &v) in cols.iter().zip(vals) {
                dense[(r, j)] = v;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> IQSample {
        IQSample::new(re, 0.0)
    }

    #[test]
    fn test_block_rows() {
        let mut block = SparseBlock::new(4);
        block.push_row([(0, c(1.0)), (3, c(2.0))]);
        block.push_row([]);
        block.push_row([(2, c(5.0))]);

        assert_eq!(block.n_rows(), 3);
        assert_eq!(block.nnz(), 3);
        assert_eq!(block.row(1).0.len(), 0);
        let dense = block.to_dense();
        assert_eq!(dense[(0, 3)], c(2.0));
        assert_eq!(dense[(2, 2)], c(5.0));
        assert_eq!(dense[(1, 0)], c(0.0));
    }

    #[test]
    fn test_stack_addresses_rows() {
        let mut a = SparseBlock::new(2);
        a.push_row([(0, c(1.0))]);
        a.push_row([(1, c(2.0))]);
        let mut b = SparseBlock::new(2);
        b.push_row([(1, c(3.0))]);
        b.push_row([(0, c(4.0))]);

        let mut stack = StackedDesign::new(2, 2);
        stack.push(a).unwrap();
        stack.push(b).unwrap();
        assert_eq!(stack.n_rows(), 4);
        assert_eq!(stack.block_rows(), 2);
        assert_eq!(stack.nnz(), 4);
        assert_eq!(stack.row(2), (&[1usize][..], &[c(3.0)][..]));

        let dense = stack.to_dense();
        assert_eq!(dense[(3, 0)], c(4.0));
        assert_eq!(dense[(1, 1)], c(2.0));
    }

    #[test]
    fn test_stack_rejects_mismatched_block() {
        let mut stack = StackedDesign::new(2, 3);
        let mut block = SparseBlock::new(3);
        block.push_row([]);
        assert!(matches!(
            stack.push(block),
            Err(LpiError::ShapeMismatch { expected: 2, actual: 1 })
        ));
        assert!(stack.push(SparseBlock::new(4)).is_err());
    }
}
