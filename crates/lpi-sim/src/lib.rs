//! # LPI Simulation
//!
//! Synthetic incoherent scatter radar data for exercising the LPI engine
//! without recorded data:
//!
//! - [`SyntheticScenario`]: pulse schedule, phase-coded transmit pulse,
//!   point targets with known ACFs, receiver and injected noise, DC offset
//! - [`CountingSource`]: wrapper counting sample reads
//!
//! Both implement the `lpi-core` source traits, so a scenario plugs
//! straight into `IntegrationCycleDriver`.

pub mod counting;
pub mod scenario;

#[cfg(test)]
mod validation;

pub use counting::CountingSource;
pub use scenario::{PointTarget, ScenarioConfig, SyntheticScenario};
