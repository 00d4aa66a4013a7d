//! Hub and clip sensor device types

use serde::{Deserialize, Serialize};
use crate::error::{MyoError, MyoResult};

/// Hardware address length in hex characters (6 bytes)
pub const ADDRESS_HEX_LEN: usize = 12;

/// Divisor mapping the raw battery byte to volts
pub const BATTERY_VOLTS_PER_UNIT: f32 = 1.0 / 50.0;

/// Voltage at or above which a battery is considered healthy
pub const LOW_BATTERY_VOLTS: f32 = 3.40;

/// Decode a raw battery byte into volts
pub fn battery_voltage(code: u8) -> f32 {
    code as f32 * BATTERY_VOLTS_PER_UNIT
}

/// Low-battery flag is set strictly below the threshold
pub fn is_low_battery(volts: f32) -> bool {
    volts < LOW_BATTERY_VOLTS
}

/// Wireless hardware address of a clip sensor, stored as uppercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Parse and normalize a 12-hex-digit hardware address
    pub fn parse(text: &str) -> MyoResult<Self> {
        if text.len() != ADDRESS_HEX_LEN {
            return Err(MyoError::InvalidAddress {
                reason: "address must be 12 hex characters",
            });
        }
        if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MyoError::InvalidAddress {
                reason: "address contains non-hex characters",
            });
        }
        Ok(HardwareAddress(text.to_ascii_uppercase()))
    }

    /// Address as its uppercase hex representation
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LED feedback state of a clip sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedState {
    /// LED dark, also used as the detach/discard indicator
    Off,
    /// Blinking, shown while awaiting operator confirmation
    Blink,
    /// Steady on, shown for registered sensors
    Steady,
}

impl LedState {
    /// Wire status code for the LED change command
    pub fn status_code(&self) -> u8 {
        match self {
            LedState::Off => 0x00,
            LedState::Blink => 0x01,
            LedState::Steady => 0x02,
        }
    }
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedState::Off => write!(f, "off"),
            LedState::Blink => write!(f, "blink"),
            LedState::Steady => write!(f, "steady"),
        }
    }
}

/// One EMG clip sensor bound to a hub channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipDevice {
    /// Unique hardware address
    pub address: HardwareAddress,
    /// Bound channel index (0-7)
    pub channel: u8,
    /// Last reported battery voltage, if any
    pub battery_volts: Option<f32>,
    /// True once a battery report fell below the threshold
    pub low_battery: bool,
    /// Last commanded LED state
    pub led: LedState,
    /// Connectivity flag from the hub's point of view
    pub connected: bool,
}

impl ClipDevice {
    /// Create a clip record as first seen in a discovery report
    pub fn new(address: HardwareAddress, channel: u8) -> Self {
        ClipDevice {
            address,
            channel,
            battery_volts: None,
            low_battery: false,
            led: LedState::Off,
            connected: true,
        }
    }

    /// Apply a raw battery byte from a report
    pub fn set_battery(&mut self, code: u8) {
        let volts = battery_voltage(code);
        self.battery_volts = Some(volts);
        self.low_battery = is_low_battery(volts);
    }
}

/// The central acquisition hub, one per active session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubDevice {
    /// Advertised hub name
    pub name: String,
    /// Last reported battery voltage, if any
    pub battery_volts: Option<f32>,
    /// True once a battery report fell below the threshold
    pub low_battery: bool,
    /// Connectivity flag
    pub connected: bool,
}

impl HubDevice {
    /// Create a hub record on successful connect
    pub fn new(name: impl Into<String>) -> Self {
        HubDevice {
            name: name.into(),
            battery_volts: None,
            low_battery: false,
            connected: true,
        }
    }

    /// Apply a raw battery byte from a report
    pub fn set_battery(&mut self, code: u8) {
        let volts = battery_voltage(code);
        self.battery_volts = Some(volts);
        self.low_battery = is_low_battery(volts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_decode() {
        let volts = battery_voltage(0xAA);
        assert!((volts - 3.40).abs() < 1e-6);
        assert!(!is_low_battery(volts));
        assert!(is_low_battery(battery_voltage(0xA9)));
    }

    #[test]
    fn test_address_normalization() {
        let addr = HardwareAddress::parse("aabbcc001122").unwrap();
        assert_eq!(addr.as_hex(), "AABBCC001122");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!(HardwareAddress::parse("AABBCC0011").is_err());
        assert!(HardwareAddress::parse("AABBCC0011ZZ").is_err());
    }

    #[test]
    fn test_clip_battery_flag() {
        let addr = HardwareAddress::parse("AABBCC001122").unwrap();
        let mut clip = ClipDevice::new(addr, 3);
        clip.set_battery(0x96); // 3.0V
        assert!(clip.low_battery);
        clip.set_battery(0xAA); // 3.4V
        assert!(!clip.low_battery);
    }
}
