//! MyoHub-Simulation: Wire-correct hub telemetry without hardware
//!
//! Generates framed telemetry for tests and development: sample batches
//! with injectable glitches and sequence gaps, battery reports,
//! discovery reports, connectivity changes and acks.

pub mod hub_simulator;

pub use hub_simulator::{HubSimulator, SimulatorConfig};
