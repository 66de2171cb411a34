//! Read-counting source wrapper.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use lpi_core::source::{PulseMetadataSource, SampleSource};
use lpi_core::types::{CodeId, IQBuffer, LpiResult, PulseId};

/// Forwards to an inner source and counts echo reads.
#[derive(Debug)]
pub struct CountingSource<S> {
    inner: S,
    reads: AtomicUsize,
}

impl<S> CountingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    /// Echo vectors read so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: SampleSource> SampleSource for CountingSource<S> {
    fn read_echo(&self, pulse: PulseId, len: usize, channel: &str) -> LpiResult<IQBuffer> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read_echo(pulse, len, channel)
    }
}

impl<S: PulseMetadataSource> PulseMetadataSource for CountingSource<S> {
    fn time_bounds(&self) -> LpiResult<(u64, u64)> {
        self.inner.time_bounds()
    }

    fn pulse_codes(&self, start: u64, end: u64) -> LpiResult<BTreeMap<PulseId, CodeId>> {
        self.inner.pulse_codes(start, end)
    }
}
