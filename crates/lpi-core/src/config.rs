//! # Configuration System
//!
//! YAML-based configuration for the LPI engine:
//!
//! - Receiver and sampling parameters (channel, sample rates, echo length)
//! - Range and lag geometry (range gate, maximum range, lag table)
//! - Low-pass filter, outlier policy, calibration and DC handling
//! - Pulse code timing table (static, validated eagerly)
//! - Output location and logging
//!
//! ## Configuration Search Path
//!
//! [`LpiConfig::load`] uses the first file found:
//! 1. Path specified via `LPI_CONFIG` environment variable
//! 2. `./lpi.yaml` (current directory)
//!
//! ## Example Configuration
//!
//! ```yaml
//! channel: "zenith-l"
//! range_gate: 30
//! min_tx_frac: 0.4
//! filter:
//!   pass_band: 100000.0
//!   half_length: 10
//! output:
//!   prefix: "lpi_e"
//!   reanalyze: false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::types::{CodeId, IQSample};

/// Error type for configuration operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),

    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Sample-index timing of one pulse code.
///
/// All values are sample indices into the raw echo vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseCodeTiming {
    /// Start of the injected calibration noise window
    pub noise_start: usize,
    /// End of the injected calibration noise window (exclusive)
    pub noise_end: usize,
    /// First transmit sample
    pub tx_start: usize,
    /// End of the transmit pulse (exclusive)
    pub tx_end: usize,
    /// First sample past the ground clutter
    pub ground_clutter_end: usize,
    /// End of the usable echo (exclusive)
    pub last_echo: usize,
    /// Extended ground clutter end
    pub extended_clutter_end: usize,
    /// Long uncoded pulse rather than one of an alternating code pair
    #[serde(default)]
    pub long_pulse: bool,
}

impl PulseCodeTiming {
    /// Transmit pulse length in samples.
    pub fn tx_length(&self) -> usize {
        self.tx_end.saturating_sub(self.tx_start)
    }

    fn validate(&self, code: CodeId, echo_length: usize, background_window: usize) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(format!("code {}: {}", code, msg)));

        if self.tx_length() == 0 {
            return fail("tx_start must be before tx_end");
        }
        if self.tx_end > echo_length {
            return fail("transmit window exceeds echo length");
        }
        if self.ground_clutter_end >= self.last_echo {
            return fail("ground_clutter_end must be before last_echo");
        }
        if self.last_echo > echo_length {
            return fail("last_echo exceeds echo length");
        }
        if self.noise_start >= self.noise_end || self.noise_end > echo_length {
            return fail("invalid injection noise window");
        }
        if self.last_echo < background_window {
            return fail("background window starts before the first sample");
        }
        Ok(())
    }
}

/// Measurement window in raw samples; converted to range-gate rows `[m0, m1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementWindow {
    pub start: usize,
    pub end: usize,
}

impl Default for MeasurementWindow {
    fn default() -> Self {
        Self { start: 800, end: 7750 }
    }
}

/// Nominal transmit pulse used to decide the lowest usable range per lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TxReference {
    /// Offset of the pulse relative to the measurement window start
    pub offset: usize,
    /// Nominal pulse length in samples
    pub pulse_length: usize,
}

impl Default for TxReference {
    fn default() -> Self {
        Self { offset: 111, pulse_length: 480 }
    }
}

/// Lag table and lag averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Lags in samples, strictly increasing
    pub values: Vec<usize>,
    /// Number of consecutive lags estimated together
    pub average: usize,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            values: (1..47).map(|i| i * 10).collect(),
            average: 2,
        }
    }
}

/// Impulse response normalization of the low-pass filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterNormalization {
    /// `sum |h|^2 = 1`
    #[default]
    UnitEnergy,
    /// `sum h = 1`, constant signals pass unchanged
    UnitDcGain,
}

/// Low-pass filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Disable to pass echoes through unfiltered
    pub enabled: bool,
    /// Pass band in Hz
    pub pass_band: f64,
    /// Cutoff frequency is `cutoff_scale * pass_band`
    pub cutoff_scale: f64,
    /// Half length of the impulse response in samples
    pub half_length: usize,
    pub normalization: FilterNormalization,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pass_band: 0.1e6,
            cutoff_scale: 1.2,
            half_length: 20,
            normalization: FilterNormalization::UnitEnergy,
        }
    }
}

impl FilterConfig {
    /// Cutoff frequency in Hz.
    pub fn cutoff(&self) -> f64 {
        self.cutoff_scale * self.pass_band
    }
}

/// Robust scale estimation and outlier rejection policy.
///
/// The constants are empirical; they are not derived from a noise model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Percentile of `|m|^2` used for the per-column scale
    pub scale_percentile: f64,
    /// Entries with `|m| / scale` above this are rejected
    pub ratio_limit: f64,
    /// Length of the moving window for the localized scale (pulses)
    pub localized_window: usize,
    /// Entries whose localized scale exceeds this multiple of the median are rejected
    pub localized_limit: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            scale_percentile: 34.0,
            ratio_limit: 10.0,
            localized_window: 10,
            localized_limit: 100.0,
        }
    }
}

/// Noise injection calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Equivalent temperature of the injected noise (K)
    pub injection_temperature: f64,
    /// Length of the quiet background window ending at `last_echo`
    pub background_window: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            injection_temperature: 1172.0,
            background_window: 500,
        }
    }
}

/// Source of the DC bias subtracted from every echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DcMode {
    /// Use the calibrated constant
    #[default]
    Fixed,
    /// Estimate once from the first pulses of the dataset
    Estimated,
}

/// DC offset handling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcConfig {
    pub mode: DcMode,
    /// Calibrated constant `[re, im]`
    pub offset: [f64; 2],
    /// Number of pulses used by the estimator
    pub estimate_pulses: usize,
    /// Quiet samples start this far past the ground clutter
    pub quiet_offset: usize,
}

impl Default for DcConfig {
    fn default() -> Self {
        Self {
            mode: DcMode::Fixed,
            offset: [-0.212, -0.221],
            estimate_pulses: 10,
            quiet_offset: 4000,
        }
    }
}

impl DcConfig {
    pub fn offset_sample(&self) -> IQSample {
        IQSample::new(self.offset[0], self.offset[1])
    }
}

/// Ground clutter cancellation pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutterConfig {
    /// Include long pulses in the inversion
    pub use_long_pulse: bool,
    /// A long pulse is paired with the pulse this many positions ahead
    pub long_pulse_stride: usize,
}

impl Default for ClutterConfig {
    fn default() -> Self {
        Self {
            use_long_pulse: true,
            long_pulse_stride: 3,
        }
    }
}

/// Output location and rerun policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one artifact per integration period
    pub prefix: PathBuf,
    /// Recompute periods that already have an artifact
    pub reanalyze: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("lpi_f"),
            reanalyze: false,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LpiConfig {
    /// Receiver channel name
    pub channel: String,
    /// Sample rate of the echo channel (Hz)
    pub sample_rate: f64,
    /// Sample rate of the pulse metadata clock (Hz)
    pub metadata_sample_rate: f64,
    /// Samples read per pulse
    pub echo_length: usize,
    /// Integration period (s)
    pub integration_period_s: f64,
    /// Extra metadata read past the period end for clutter partners (samples)
    pub lookahead_samples: u64,
    /// Range gate width in samples; also the decimation ratio
    pub range_gate: usize,
    /// Highest analysed round-trip delay in samples
    pub max_range_delay: usize,
    /// Fraction of the pulse that must remain unclipped by the ground clutter
    pub min_tx_frac: f64,
    pub measurement_window: MeasurementWindow,
    pub tx_reference: TxReference,
    pub lags: LagConfig,
    pub filter: FilterConfig,
    pub outlier: OutlierConfig,
    pub calibration: CalibrationConfig,
    pub dc: DcConfig,
    pub clutter: ClutterConfig,
    /// Pulse code timing table
    pub codes: BTreeMap<CodeId, PulseCodeTiming>,
    pub output: OutputConfig,
    pub logging: LogConfig,
}

impl Default for LpiConfig {
    fn default() -> Self {
        Self {
            channel: "zenith-l".to_string(),
            sample_rate: 1_000_000.0,
            metadata_sample_rate: 1_000_000.0,
            echo_length: 10_000,
            integration_period_s: 10.0,
            lookahead_samples: 40_000,
            range_gate: 60,
            max_range_delay: 7000,
            min_tx_frac: 0.5,
            measurement_window: MeasurementWindow::default(),
            tx_reference: TxReference::default(),
            lags: LagConfig::default(),
            filter: FilterConfig::default(),
            outlier: OutlierConfig::default(),
            calibration: CalibrationConfig::default(),
            dc: DcConfig::default(),
            clutter: ClutterConfig::default(),
            codes: default_code_table(),
            output: OutputConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Millstone Hill zenith timing: long pulse 300 and alternating codes 1..=32.
pub fn default_code_table() -> BTreeMap<CodeId, PulseCodeTiming> {
    let mut codes = BTreeMap::new();
    codes.insert(
        300,
        PulseCodeTiming {
            noise_start: 7800,
            noise_end: 8371,
            tx_start: 76,
            tx_end: 645,
            ground_clutter_end: 1000,
            last_echo: 7700,
            extended_clutter_end: 800,
            long_pulse: true,
        },
    );
    for code in 1..=32 {
        codes.insert(
            code,
            PulseCodeTiming {
                noise_start: 8400,
                noise_end: 8850,
                tx_start: 76,
                tx_end: 624,
                ground_clutter_end: 1000,
                last_echo: 8200,
                extended_clutter_end: 800,
                long_pulse: false,
            },
        );
    }
    codes
}

impl LpiConfig {
    /// Load configuration from the search path, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::config_search_paths() {
            if path.exists() {
                tracing::info!("Loading configuration from {}", path.display());
                return Self::load_from(&path);
            }
        }
        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var("LPI_CONFIG") {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("lpi.yaml"));
        paths
    }

    /// Number of range gates, `floor(max_range_delay / range_gate)`.
    pub fn n_ranges(&self) -> usize {
        self.max_range_delay / self.range_gate.max(1)
    }

    /// Integration period length on the metadata clock.
    pub fn period_samples(&self) -> u64 {
        (self.integration_period_s * self.metadata_sample_rate).round() as u64
    }

    /// Largest distance from a pulse to its clutter reference partner.
    pub fn pairing_margin(&self) -> usize {
        let has_long = self.clutter.use_long_pulse && self.codes.values().any(|t| t.long_pulse);
        if has_long {
            self.clutter.long_pulse_stride.max(1)
        } else {
            1
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.sample_rate <= 0.0 || self.metadata_sample_rate <= 0.0 {
            return fail("sample rates must be positive".into());
        }
        if self.integration_period_s <= 0.0 {
            return fail("integration_period_s must be positive".into());
        }
        if self.range_gate == 0 {
            return fail("range_gate must be at least one sample".into());
        }
        if self.n_ranges() == 0 {
            return fail("max_range_delay is shorter than one range gate".into());
        }
        if !(0.0..=1.0).contains(&self.min_tx_frac) {
            return fail(format!("min_tx_frac {} outside [0, 1]", self.min_tx_frac));
        }
        if self.codes.is_empty() {
            return fail("pulse code timing table is empty".into());
        }
        for (code, timing) in &self.codes {
            timing.validate(*code, self.echo_length, self.calibration.background_window)?;
        }

        let lags = &self.lags;
        if lags.average == 0 {
            return fail("lag average must be at least 1".into());
        }
        if lags.values.len() <= lags.average {
            return fail(format!(
                "need more than {} lags, got {}",
                lags.average,
                lags.values.len()
            ));
        }
        if lags.values.windows(2).any(|w| w[0] >= w[1]) || lags.values[0] == 0 {
            return fail("lags must be positive and strictly increasing".into());
        }
        let max_lag = lags.values[lags.values.len() - 1];
        if max_lag >= self.echo_length {
            return fail(format!("lag {} exceeds echo length", max_lag));
        }

        let window = self.measurement_window;
        if window.start >= window.end || window.end > self.echo_length {
            return fail("invalid measurement window".into());
        }

        let filter = &self.filter;
        if filter.enabled {
            if filter.half_length == 0 {
                return fail("filter half_length must be positive".into());
            }
            if 2 * filter.half_length > self.echo_length {
                return fail(format!(
                    "filter length {} exceeds echo length {}",
                    2 * filter.half_length,
                    self.echo_length
                ));
            }
            if filter.cutoff() <= 0.0 || filter.cutoff() > 0.5 * self.sample_rate {
                return fail(format!("filter cutoff {} Hz outside (0, fs/2]", filter.cutoff()));
            }
        }

        let outlier = &self.outlier;
        if !(outlier.scale_percentile > 0.0 && outlier.scale_percentile <= 100.0) {
            return fail("scale_percentile must be in (0, 100]".into());
        }
        if outlier.localized_window == 0 {
            return fail("localized_window must be positive".into());
        }
        if outlier.ratio_limit <= 0.0 || outlier.localized_limit <= 0.0 {
            return fail("outlier limits must be positive".into());
        }
        if self.calibration.background_window == 0 {
            return fail("background_window must be positive".into());
        }
        if self.dc.mode == DcMode::Estimated && self.dc.estimate_pulses < 3 {
            return fail("DC estimation needs at least 3 pulses".into());
        }

        // Range and lag geometry depends on the fields validated above.
        crate::lags::LagPlan::from_config(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LpiConfig::default();
        config.validate().unwrap();
        assert_eq!(config.n_ranges(), 116);
        assert_eq!(config.codes.len(), 33);
        assert!(config.codes[&300].long_pulse);
        assert_eq!(config.pairing_margin(), 3);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
channel: "zenith-l"
range_gate: 30
min_tx_frac: 0.4
filter:
  half_length: 10
output:
  prefix: "lpi_e"
"#;
        let config = LpiConfig::parse(yaml).unwrap();
        assert_eq!(config.range_gate, 30);
        assert_eq!(config.filter.half_length, 10);
        assert_eq!(config.filter.pass_band, 0.1e6);
        assert_eq!(config.output.prefix, PathBuf::from("lpi_e"));
        assert_eq!(config.n_ranges(), 233);
    }

    #[test]
    fn test_parse_code_table() {
        let yaml = r#"
codes:
  5:
    noise_start: 8400
    noise_end: 8850
    tx_start: 76
    tx_end: 624
    ground_clutter_end: 1000
    last_echo: 8200
    extended_clutter_end: 800
"#;
        let config = LpiConfig::parse(yaml).unwrap();
        assert_eq!(config.codes.len(), 1);
        assert!(!config.codes[&5].long_pulse);
        assert_eq!(config.pairing_margin(), 1);
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let mut config = LpiConfig::default();
        config.codes.get_mut(&7).unwrap().tx_end = 50;
        assert_eq!(config.codes[&7].tx_length(), 0);
        assert_eq!(config.codes[&8].tx_length(), 548);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code 7"));
    }

    #[test]
    fn test_filter_longer_than_echo_rejected() {
        let mut config = LpiConfig::default();
        config.filter.half_length = 5000;
        config.validate().unwrap();

        config.filter.half_length = 5001;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds echo length"));

        config.filter.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_non_increasing_lags_rejected() {
        let mut config = LpiConfig::default();
        config.lags.values = vec![10, 30, 20, 40];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = LpiConfig::parse("range_gate: [not, a, number]");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lpi.yaml");
        let mut config = LpiConfig::default();
        config.range_gate = 120;
        config.save(&path).unwrap();
        let loaded = LpiConfig::load_from(&path).unwrap();
        assert_eq!(loaded.range_gate, 120);
        assert_eq!(loaded.codes, config.codes);
    }
}
