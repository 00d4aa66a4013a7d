//! MyoHub-Core: Foundation types for the EMG acquisition hub link
//!
//! Shared device/channel types and errors used by the protocol codec,
//! the signal conditioner and the device session.

pub mod channel;
pub mod device;
pub mod error;

pub use channel::*;
pub use device::*;
pub use error::{MyoError, MyoResult};
