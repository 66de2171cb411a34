//! Parallel processing with Rayon
//!
//! Enable with the `parallel` feature flag:
//!
//! ```toml
//! [dependencies]
//! lpi-core = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! Two levels are parallelized: the independent per-lag inversions of one
//! period, and whole workers of a partition. Pulse preprocessing within a
//! period stays sequential.

use rayon::prelude::*;

use crate::driver::{IntegrationCycleDriver, RunSummary, WorkerPartition};
use crate::estimator::{LagAccumulator, LagSolution, PerLagEstimator};
use crate::sink::ResultSink;
use crate::source::{PulseMetadataSource, SampleSource};
use crate::types::LpiResult;

/// Solve every lag group on the Rayon pool, in lag order.
pub fn solve_lags(
    estimator: &PerLagEstimator,
    accumulators: &[LagAccumulator],
) -> Vec<LpiResult<LagSolution>> {
    accumulators
        .par_iter()
        .enumerate()
        .map(|(li, acc)| estimator.estimate(li, acc))
        .collect()
}

impl<S, M> IntegrationCycleDriver<S, M>
where
    S: SampleSource + Sync,
    M: PulseMetadataSource + Sync,
{
    /// Run all `size` ranks of a partition concurrently, one sink per rank.
    pub fn run_workers<K, F>(&self, size: usize, make_sink: F) -> RunSummary
    where
        K: ResultSink,
        F: Fn(usize) -> K + Sync,
    {
        (0..size.max(1))
            .into_par_iter()
            .map(|rank| {
                let mut sink = make_sink(rank);
                self.run(WorkerPartition::new(rank, size), &mut sink)
            })
            .reduce(RunSummary::default, RunSummary::merge)
    }
}
