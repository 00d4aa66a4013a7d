//! Configuration for signal conditioning

use serde::{Deserialize, Serialize};

/// Tunable parameters of the signal conditioner
///
/// Defaults match the validated hardware calibration; change them only
/// against recorded reference sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionerConfig {
    /// Raw samples recorded per channel before cleaning starts
    pub warmup_samples: usize,
    /// Raw values strictly above this are rejected as glitches
    pub glitch_ceiling: u16,
    /// Maximum allowed jump from the last cleaned value
    pub glitch_jump: u16,
    /// Window width for the rolling average
    pub average_window: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            warmup_samples: 120,
            glitch_ceiling: 40_000,
            glitch_jump: 5_000,
            average_window: 26,
        }
    }
}
