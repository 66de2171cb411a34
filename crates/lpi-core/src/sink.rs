//! Result sinks
//!
//! A sink stores one artifact per integration period and answers whether a
//! period already has one; the driver skips those periods unless asked to
//! reanalyze.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::result::AcfResult;
use crate::types::{IQSample, LpiResult};

/// Destination of per-period results.
pub trait ResultSink {
    /// Whether the period starting at `start` is already stored.
    fn contains(&self, start: u64) -> bool;

    fn write(&mut self, result: &AcfResult) -> LpiResult<()>;
}

/// In-memory sink keyed by period start.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: BTreeMap<u64, AcfResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, start: u64) -> Option<&AcfResult> {
        self.results.get(&start)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = &AcfResult> {
        self.results.values()
    }
}

impl ResultSink for MemorySink {
    fn contains(&self, start: u64) -> bool {
        self.results.contains_key(&start)
    }

    fn write(&mut self, result: &AcfResult) -> LpiResult<()> {
        self.results.insert(result.start, result.clone());
        Ok(())
    }
}

/// Serialized form of [`AcfResult`]. NaN is stored as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcfRecord {
    pub start: u64,
    pub start_time_s: f64,
    /// `[range][lag] -> [re, im]`
    pub acf_mitigated: Vec<Vec<[Option<f64>; 2]>>,
    pub acf_raw: Vec<Vec<[Option<f64>; 2]>>,
    pub variance: Vec<Vec<Option<f64>>>,
    pub range_km: Vec<f64>,
    pub lag_s: Vec<f64>,
    pub system_temperature: Option<f64>,
    pub calibration_scale: Option<f64>,
    pub noise_power: Option<f64>,
    pub dc_offset: [Option<f64>; 2],
    pub pass_band: Option<f64>,
    pub filter_half_length: usize,
    pub pulses_used: usize,
    pub lags_failed: Vec<usize>,
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

fn complex_pair(z: IQSample) -> [Option<f64>; 2] {
    [finite(z.re), finite(z.im)]
}

fn rows<T: nalgebra::Scalar, U>(m: &DMatrix<T>, f: impl Fn(&T) -> U) -> Vec<Vec<U>> {
    (0..m.nrows())
        .map(|r| (0..m.ncols()).map(|c| f(&m[(r, c)])).collect())
        .collect()
}

impl From<&AcfResult> for AcfRecord {
    fn from(r: &AcfResult) -> Self {
        Self {
            start: r.start,
            start_time_s: r.start_time_s,
            acf_mitigated: rows(&r.acf_mitigated, |z| complex_pair(*z)),
            acf_raw: rows(&r.acf_raw, |z| complex_pair(*z)),
            variance: rows(&r.variance, |v| finite(*v)),
            range_km: r.range_km.clone(),
            lag_s: r.lag_s.clone(),
            system_temperature: finite(r.system_temperature),
            calibration_scale: finite(r.calibration_scale),
            noise_power: finite(r.noise_power),
            dc_offset: complex_pair(r.dc_offset),
            pass_band: finite(r.pass_band),
            filter_half_length: r.filter_half_length,
            pulses_used: r.pulses_used,
            lags_failed: r.lags_failed.clone(),
        }
    }
}

impl AcfRecord {
    /// ACF value at `(range, lag)`, NaN where missing.
    pub fn acf_raw_at(&self, range: usize, lag: usize) -> IQSample {
        let [re, im] = self.acf_raw[range][lag];
        IQSample::new(re.unwrap_or(f64::NAN), im.unwrap_or(f64::NAN))
    }
}

/// Writes `<prefix>/lpi-<start seconds>.json` per period.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    prefix: PathBuf,
    clock_rate: f64,
}

impl JsonFileSink {
    /// Sink under `prefix`; `clock_rate` converts period starts to seconds.
    pub fn new(prefix: impl Into<PathBuf>, clock_rate: f64) -> Self {
        Self {
            prefix: prefix.into(),
            clock_rate,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Artifact path of the period starting at `start`.
    pub fn path_for(&self, start: u64) -> PathBuf {
        let seconds = (start as f64 / self.clock_rate).floor() as u64;
        self.prefix.join(format!("lpi-{}.json", seconds))
    }

    /// Load a stored artifact.
    pub fn read(&self, start: u64) -> LpiResult<AcfRecord> {
        let content = fs::read_to_string(self.path_for(start))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ResultSink for JsonFileSink {
    fn contains(&self, start: u64) -> bool {
        self.path_for(start).exists()
    }

    fn write(&mut self, result: &AcfResult) -> LpiResult<()> {
        fs::create_dir_all(&self.prefix)?;
        let path = self.path_for(result.start);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&AcfRecord::from(result))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        tracing::info!(path = %path.display(), "wrote ACF artifact");
        Ok(())
    }
}
