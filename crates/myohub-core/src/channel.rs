//! Per-channel sample storage

use serde::{Deserialize, Serialize};
use crate::error::{MyoError, MyoResult};

/// Number of sensor channels exposed by the hub
pub const CHANNEL_COUNT: usize = 8;

/// Validate a channel index against the hub's slot range
pub fn validate_channel(index: usize) -> MyoResult<()> {
    if index >= CHANNEL_COUNT {
        Err(MyoError::InvalidChannel {
            index,
            max: CHANNEL_COUNT - 1,
        })
    } else {
        Ok(())
    }
}

/// Ordered sample sequences owned by one channel
///
/// Raw samples arrive from the telemetry decoder, cleaned samples are
/// produced by glitch rejection, and averages are the externally
/// consumed smoothed output. Buffers are never shared across channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelBuffers {
    /// Samples exactly as decoded from the wire
    pub raw: Vec<u16>,
    /// Samples after glitch rejection
    pub cleaned: Vec<u16>,
    /// Rolling averages over the cleaned sequence
    pub averages: Vec<u16>,
}

impl ChannelBuffers {
    /// Create empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all three sequences (full measurement reset)
    pub fn reset(&mut self) {
        self.raw.clear();
        self.cleaned.clear();
        self.averages.clear();
    }

    /// Most recent cleaned sample, if any
    pub fn last_cleaned(&self) -> Option<u16> {
        self.cleaned.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_channel() {
        assert!(validate_channel(0).is_ok());
        assert!(validate_channel(7).is_ok());
        assert!(validate_channel(8).is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut buffers = ChannelBuffers::new();
        buffers.raw.push(100);
        buffers.cleaned.push(100);
        buffers.averages.push(100);
        buffers.reset();
        assert!(buffers.raw.is_empty());
        assert!(buffers.cleaned.is_empty());
        assert!(buffers.averages.is_empty());
    }
}
