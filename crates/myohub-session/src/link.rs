//! Link transport seam and inbound event queue
//!
//! The physical link (BLE characteristic, serial bridge, simulator)
//! sits behind `LinkTransport` for outbound frames and feeds inbound
//! activity through an mpsc channel of `LinkEvent`s, consumed by the
//! single session loop in strict arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use myohub_core::{HardwareAddress, MyoError, MyoResult};

/// Outbound side of the physical link
pub trait LinkTransport: Send {
    /// Whether the link and its write characteristic are established
    fn is_ready(&self) -> bool;

    /// Queue one wire frame for transmission
    fn send_frame(&self, frame: &str) -> MyoResult<()>;
}

/// One inbound occurrence on the link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The link to the selected hub came up
    Connected,
    /// The link dropped, spontaneously or on request
    Disconnected,
    /// A hub advertised itself while scanning
    PeerDiscovered {
        address: HardwareAddress,
        name: Option<String>,
    },
    /// A complete telemetry frame arrived
    Frame(String),
}

/// In-memory transport recording sent frames
///
/// Used by tests and development against the simulator; clones share
/// the same frame log and readiness flag.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    ready: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the link ready or not ready for writes
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Snapshot of every frame sent so far, in order
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl LinkTransport for MemoryLink {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send_frame(&self, frame: &str) -> MyoResult<()> {
        if !self.is_ready() {
            return Err(MyoError::LinkNotReady);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(frame.to_string());
        }
        Ok(())
    }
}
