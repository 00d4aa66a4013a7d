//! Configuration for the device session

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Timing and capacity parameters of the session actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Scan phase timeout in seconds
    pub scan_timeout: f32,
    /// Interval between stop-command retries in seconds
    pub stop_poll_interval: f32,
    /// One-time delay before the first stop retry when not restarting,
    /// in seconds
    pub stop_grace: f32,
    /// Spacing between consecutive outbound writes in seconds; the
    /// protocol forbids pipelining, commands must land one at a time
    pub write_spacing: f32,
    /// Broadcast capacity for session events
    pub event_capacity: usize,
    /// Queue capacity for operator commands
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: 30.0,
            stop_poll_interval: 0.7,
            stop_grace: 2.8,
            write_spacing: 0.25,
            event_capacity: 64,
            command_capacity: 32,
        }
    }
}

impl SessionConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.scan_timeout)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_secs_f32(self.stop_poll_interval)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs_f32(self.stop_grace)
    }

    pub fn write_spacing(&self) -> Duration {
        Duration::from_secs_f32(self.write_spacing)
    }
}
