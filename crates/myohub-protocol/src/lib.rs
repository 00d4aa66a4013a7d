//! MyoHub-Protocol: Framed hex wire protocol for the acquisition hub
//!
//! Frame codec, outbound command encoding and inbound telemetry decoding.
//! The hub speaks ASCII-hex text frames over the wireless link.

pub mod command;
pub mod frame;
pub mod telemetry;

pub use command::{channel_bitmap, HubCommand};
pub use frame::{decode, encode};
pub use telemetry::{decode_event, decode_frame, TelemetryEvent};
