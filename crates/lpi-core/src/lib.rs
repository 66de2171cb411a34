//! # Lag Profile Inversion
//!
//! This crate estimates range and lag resolved autocorrelation functions
//! (ACFs) of incoherent scatter radar echoes from raw complex voltage
//! samples, using lag profile inversion: a weighted linear inversion that
//! undoes the smearing of the transmit pulse over range, cancels ground
//! clutter and copes with heavy-tailed measurement noise.
//!
//! ## Overview
//!
//! - **Filtering**: Hann-windowed sinc low-pass applied in the FFT domain
//! - **Lag products**: decimated to range-gate resolution
//! - **Ambiguity**: per-pulse design blocks from the transmit waveform
//! - **Clutter**: subtraction of a same-code partner pulse
//! - **Robust weighting**: percentile and localized noise scales, outlier
//!   rejection
//! - **Inversion**: weighted normal equations per lag, error variance
//! - **Calibration**: system temperature from noise injection
//!
//! ## Signal Flow
//!
//! ```text
//! metadata → pulse sequence → read echo + partner → mask → filter → lag products → decimate
//!                                                                               ↓
//! sink ← AcfResult ← per-lag inversion ← robust weighting ← stacked design blocks
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use lpi_core::prelude::*;
//!
//! struct Recording;
//!
//! impl SampleSource for Recording {
//!     fn read_echo(&self, _pulse: PulseId, len: usize, _channel: &str) -> LpiResult<IQBuffer> {
//!         Ok(vec![IQSample::new(0.0, 0.0); len])
//!     }
//! }
//!
//! impl PulseMetadataSource for Recording {
//!     fn time_bounds(&self) -> LpiResult<(u64, u64)> {
//!         Ok((0, 60_000_000))
//!     }
//!     fn pulse_codes(&self, start: u64, end: u64) -> LpiResult<BTreeMap<PulseId, CodeId>> {
//!         Ok((start..end).step_by(10_000).map(|t| (t, 1 + (t / 20_000 % 32) as CodeId)).collect())
//!     }
//! }
//!
//! let config = LpiConfig::load()?;
//! lpi_core::logging::init_logging(&config.logging);
//!
//! let mut sink = JsonFileSink::new(&config.output.prefix, config.metadata_sample_rate);
//! let driver = IntegrationCycleDriver::new(config, Recording, Recording)?;
//! let summary = driver.run(WorkerPartition::single(), &mut sink);
//! println!("{} periods processed", summary.processed);
//! # Ok::<(), LpiError>(())
//! ```

pub mod ambiguity;
pub mod calibration;
pub mod config;
pub mod dc_offset;
pub mod decimator;
pub mod driver;
pub mod estimator;
pub mod fft_utils;
pub mod filter;
pub mod lags;
pub mod logging;
pub mod pulse;
pub mod result;
pub mod sink;
pub mod source;
pub mod sparse;
pub mod stats;
pub mod types;

// Parallel processing (requires `parallel` feature)
#[cfg(feature = "parallel")]
pub mod parallel;

// Re-export main types
pub use calibration::{Calibration, CalibrationAccumulator, CalibrationSample};
pub use config::{ConfigError, LpiConfig, PulseCodeTiming};
pub use driver::{IntegrationCycleDriver, RunSummary, WorkerPartition};
pub use estimator::{LagAccumulator, LagSolution, PerLagEstimator, RobustScale};
pub use filter::LowPassFilter;
pub use lags::LagPlan;
pub use pulse::{PulsePreprocessor, PulseRole};
pub use result::AcfResult;
pub use sink::{JsonFileSink, MemorySink, ResultSink};
pub use source::{PulseMetadataSource, SampleSource};
pub use types::{CodeId, IQBuffer, IQSample, LpiError, LpiResult, PulseId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::LpiConfig;
    pub use crate::driver::{IntegrationCycleDriver, RunSummary, WorkerPartition};
    pub use crate::result::AcfResult;
    pub use crate::sink::{JsonFileSink, MemorySink, ResultSink};
    pub use crate::source::{PulseMetadataSource, SampleSource};
    pub use crate::types::{CodeId, IQBuffer, IQSample, LpiError, LpiResult, PulseId};
}
