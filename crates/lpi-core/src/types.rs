//! Core types for lag profile inversion
//!
//! Sample representation, identifiers and the error taxonomy shared by every
//! stage of the engine.
//!
//! ## Error taxonomy
//!
//! ```text
//! period-fatal      UnknownPulseCode, UnhandledPulseSequence, Source
//!                   -> the whole integration period is abandoned
//! lag-recoverable   SingularMatrix, NoValidMeasurements, ShapeMismatch
//!                   -> one lag stays NaN, other lags are unaffected
//! per-datum         (no error) NaN samples propagate as missing data
//! ```

use num_complex::Complex64;

use crate::config::ConfigError;

/// A single complex voltage sample.
pub type IQSample = Complex64;

/// A buffer of complex voltage samples.
pub type IQBuffer = Vec<IQSample>;

/// Pulse identifier: the transmit time on the metadata clock (samples).
pub type PulseId = u64;

/// Pulse code identifier as stored in the pulse metadata.
pub type CodeId = u32;

/// Result type for LPI operations.
pub type LpiResult<T> = Result<T, LpiError>;

/// Not-a-number complex sample, used to mark missing data.
pub const NAN_SAMPLE: IQSample = Complex64::new(f64::NAN, f64::NAN);

/// Complex zero.
pub const ZERO_SAMPLE: IQSample = Complex64::new(0.0, 0.0);

/// Errors that can occur while estimating ACFs.
#[derive(Debug, thiserror::Error)]
pub enum LpiError {
    #[error("unknown pulse code {code} for pulse {pulse}")]
    UnknownPulseCode { pulse: PulseId, code: CodeId },

    #[error("unhandled pulse sequence at pulse {pulse} (code {code}): no clutter reference partner")]
    UnhandledPulseSequence { pulse: PulseId, code: CodeId },

    #[error("sample source error: {0}")]
    Source(String),

    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("information matrix for lag {lag} is singular")]
    SingularMatrix { lag: usize },

    #[error("no valid measurements for lag {lag}")]
    NoValidMeasurements { lag: usize },

    #[error("need at least {needed} pulses, got {actual}")]
    InsufficientPulses { needed: usize, actual: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("result sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LpiError {
    /// Check if this error abandons a whole integration period.
    pub fn is_period_fatal(&self) -> bool {
        matches!(
            self,
            LpiError::UnknownPulseCode { .. }
                | LpiError::UnhandledPulseSequence { .. }
                | LpiError::Source(_)
        )
    }

    /// Check if this error only affects a single lag.
    pub fn is_lag_recoverable(&self) -> bool {
        matches!(
            self,
            LpiError::SingularMatrix { .. }
                | LpiError::NoValidMeasurements { .. }
                | LpiError::ShapeMismatch { .. }
        )
    }
}

/// Helpers for complex sample buffers.
pub mod complex_ops {
    use super::*;

    /// True when neither component is NaN or infinite.
    #[inline]
    pub fn is_valid(z: IQSample) -> bool {
        z.re.is_finite() && z.im.is_finite()
    }

    /// Total energy `sum |z|^2`.
    pub fn energy(samples: &[IQSample]) -> f64 {
        samples.iter().map(|z| z.norm_sqr()).sum()
    }

    /// Arithmetic mean. Empty input gives NaN.
    pub fn mean(samples: &[IQSample]) -> IQSample {
        if samples.is_empty() {
            return NAN_SAMPLE;
        }
        samples.iter().sum::<IQSample>() / samples.len() as f64
    }

    /// Mean power around a reference value, `mean |z - reference|^2`.
    pub fn mean_power_about(samples: &[IQSample], reference: IQSample) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        samples.iter().map(|z| (z - reference).norm_sqr()).sum::<f64>() / samples.len() as f64
    }

    /// Lag product `z[t] * conj(z[t + lag])` for `t` in `0 .. len - lag`.
    pub fn lag_product(z: &[IQSample], lag: usize) -> IQBuffer {
        if lag >= z.len() {
            return Vec::new();
        }
        z[..z.len() - lag]
            .iter()
            .zip(z[lag..].iter())
            .map(|(a, b)| a * b.conj())
            .collect()
    }
}
