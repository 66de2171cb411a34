//! Input interfaces: raw echo samples and pulse metadata.

use std::collections::BTreeMap;

use crate::types::{CodeId, IQBuffer, LpiResult, PulseId};

/// Random access to raw complex voltage samples.
pub trait SampleSource {
    /// Read `len` samples of `channel` starting at the transmit time of `pulse`.
    fn read_echo(&self, pulse: PulseId, len: usize, channel: &str) -> LpiResult<IQBuffer>;
}

/// Pulse metadata on its own sample clock.
pub trait PulseMetadataSource {
    /// First and last sample index covered by the metadata.
    fn time_bounds(&self) -> LpiResult<(u64, u64)>;

    /// Pulses transmitted in `[start, end)`, ordered by pulse id.
    fn pulse_codes(&self, start: u64, end: u64) -> LpiResult<BTreeMap<PulseId, CodeId>>;
}

impl<T: SampleSource + ?Sized> SampleSource for &T {
    fn read_echo(&self, pulse: PulseId, len: usize, channel: &str) -> LpiResult<IQBuffer> {
        (**self).read_echo(pulse, len, channel)
    }
}

impl<T: PulseMetadataSource + ?Sized> PulseMetadataSource for &T {
    fn time_bounds(&self) -> LpiResult<(u64, u64)> {
        (**self).time_bounds()
    }

    fn pulse_codes(&self, start: u64, end: u64) -> LpiResult<BTreeMap<PulseId, CodeId>> {
        (**self).pulse_codes(start, end)
    }
}
