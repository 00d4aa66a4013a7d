//! MyoHub-Processing: Signal conditioning for decoded EMG samples
//!
//! Per-channel glitch rejection and rolling-average smoothing. The
//! averages sequence is what downstream scoring consumes.

pub mod conditioner;
pub mod config;

pub use conditioner::{SignalConditioner, GLITCH_KERNEL};
pub use config::ConditionerConfig;
