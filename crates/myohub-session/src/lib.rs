//! MyoHub-Session: Device session actor for the acquisition hub
//!
//! Owns the link lifecycle, the sensor/hub registry and LED feedback
//! orchestration. All state mutations happen on one sequential actor
//! loop so inbound link events never race outbound command issuance.

pub mod config;
pub mod link;
pub mod scheduler;
pub mod session;

pub use config::SessionConfig;
pub use link::{LinkEvent, LinkTransport, MemoryLink};
pub use scheduler::WriteScheduler;
pub use session::{
    spawn_session, DetachTarget, DeviceSession, DiscoveredPeer, SessionCommand,
    SessionEvent, SessionState,
};
