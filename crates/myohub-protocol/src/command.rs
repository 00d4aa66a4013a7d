//! Outbound command encoding
//!
//! Maps semantic hub operations to their command byte and payload hex
//! text. Payload width is per-command, not globally fixed.

use myohub_core::{HardwareAddress, LedState, CHANNEL_COUNT};

use crate::frame;

/// Start measurement with a channel bitmap payload
pub const CMD_START_MEASUREMENT: u8 = 0x52;
/// Stop measurement
pub const CMD_STOP_MEASUREMENT: u8 = 0x53;
/// Request a battery report
pub const CMD_BATTERY_REQUEST: u8 = 0x54;
/// Re-request a lost sample packet by sequence number
pub const CMD_MISSING_DATA: u8 = 0x55;
/// Rename the hub
pub const CMD_RENAME_DEVICE: u8 = 0x60;
/// Request connectivity info for all sensors
pub const CMD_CONNECTIVITY_REQUEST: u8 = 0x61;
/// Delete all sensor pairings
pub const CMD_DELETE_ALL_PAIRINGS: u8 = 0x62;
/// Delete the pairing in one slot
pub const CMD_DELETE_PAIRING: u8 = 0x63;
/// Power the hub off
pub const CMD_HUB_POWER_OFF: u8 = 0x64;
/// Power one sensor off
pub const CMD_SENSOR_POWER_OFF: u8 = 0x65;
/// Change a sensor's LED state
pub const CMD_LED_CHANGE: u8 = 0x66;

/// Payload used by commands that carry no arguments
const ZERO_PAYLOAD: &str = "00";

/// Pack per-channel attachment flags into the start-measurement byte
///
/// Bit i is set iff channel i has an attached sensor, so channels
/// {0, 3, 7} yield `0x89`.
pub fn channel_bitmap(attached: &[bool; CHANNEL_COUNT]) -> u8 {
    let mut bitmap = 0u8;
    for (channel, &present) in attached.iter().enumerate() {
        if present {
            bitmap |= 1 << channel;
        }
    }
    bitmap
}

/// A semantic operation addressed to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    /// Begin streaming samples from the attached channels
    StartMeasuring { attached: [bool; CHANNEL_COUNT] },
    /// Stop streaming samples
    StopMeasuring,
    /// Ask for a battery report
    RequestBattery,
    /// Ask the hub to resend one sample packet
    RequestMissingData { sequence: u32 },
    /// Rename the hub
    RenameDevice { name: String },
    /// Ask for connectivity info on all sensors
    RequestConnectivityInfo,
    /// Forget every sensor pairing
    DeleteAllPairings,
    /// Forget the pairing in one slot
    DeletePairing { slot: u8 },
    /// Power the hub off
    PowerOffHub,
    /// Power one sensor off
    PowerOffSensor { address: HardwareAddress },
    /// Change one sensor's LED state
    SetLed { address: HardwareAddress, state: LedState },
}

impl HubCommand {
    /// Wire command byte
    pub fn id(&self) -> u8 {
        match self {
            HubCommand::StartMeasuring { .. } => CMD_START_MEASUREMENT,
            HubCommand::StopMeasuring => CMD_STOP_MEASUREMENT,
            HubCommand::RequestBattery => CMD_BATTERY_REQUEST,
            HubCommand::RequestMissingData { .. } => CMD_MISSING_DATA,
            HubCommand::RenameDevice { .. } => CMD_RENAME_DEVICE,
            HubCommand::RequestConnectivityInfo => CMD_CONNECTIVITY_REQUEST,
            HubCommand::DeleteAllPairings => CMD_DELETE_ALL_PAIRINGS,
            HubCommand::DeletePairing { .. } => CMD_DELETE_PAIRING,
            HubCommand::PowerOffHub => CMD_HUB_POWER_OFF,
            HubCommand::PowerOffSensor { .. } => CMD_SENSOR_POWER_OFF,
            HubCommand::SetLed { .. } => CMD_LED_CHANGE,
        }
    }

    /// Payload hex text for this command
    pub fn payload(&self) -> String {
        match self {
            HubCommand::StartMeasuring { attached } => {
                format!("{:02X}", channel_bitmap(attached))
            }
            HubCommand::StopMeasuring
            | HubCommand::RequestBattery
            | HubCommand::RequestConnectivityInfo
            | HubCommand::DeleteAllPairings
            | HubCommand::PowerOffHub => ZERO_PAYLOAD.to_string(),
            HubCommand::RequestMissingData { sequence } => {
                format!("{:08X}", sequence)
            }
            // Legacy firmware quirk: each character's ASCII code is sent
            // as decimal digits, not hex.
            HubCommand::RenameDevice { name } => {
                name.chars().map(|c| (c as u32).to_string()).collect()
            }
            HubCommand::DeletePairing { slot } => {
                format!("{:02X}", slot)
            }
            HubCommand::PowerOffSensor { address } => address.as_hex().to_string(),
            HubCommand::SetLed { address, state } => {
                format!("{}{:02X}", address.as_hex(), state.status_code())
            }
        }
    }

    /// Encode this command into one complete wire frame
    pub fn to_frame(&self) -> String {
        frame::encode(self.id(), &self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    fn addr() -> HardwareAddress {
        HardwareAddress::parse("AABBCC001122").unwrap()
    }

    #[test]
    fn test_channel_bitmap() {
        let mut attached = [false; CHANNEL_COUNT];
        attached[0] = true;
        attached[3] = true;
        attached[7] = true;
        assert_eq!(channel_bitmap(&attached), 0x89);
        assert_eq!(channel_bitmap(&[false; CHANNEL_COUNT]), 0x00);
        assert_eq!(channel_bitmap(&[true; CHANNEL_COUNT]), 0xFF);
    }

    #[test]
    fn test_start_measuring_payload() {
        let mut attached = [false; CHANNEL_COUNT];
        attached[0] = true;
        attached[3] = true;
        attached[7] = true;
        let cmd = HubCommand::StartMeasuring { attached };
        assert_eq!(cmd.payload(), "89");
    }

    #[test]
    fn test_rename_uses_decimal_ascii() {
        let cmd = HubCommand::RenameDevice { name: "AB1".to_string() };
        assert_eq!(cmd.payload(), "656649");
    }

    #[test]
    fn test_missing_data_width() {
        let cmd = HubCommand::RequestMissingData { sequence: 42 };
        assert_eq!(cmd.payload(), "0000002A");
    }

    #[test]
    fn test_led_change_payload() {
        let cmd = HubCommand::SetLed { address: addr(), state: LedState::Blink };
        assert_eq!(cmd.payload(), "AABBCC00112201");
    }

    #[test]
    fn test_every_command_round_trips() {
        let commands = vec![
            HubCommand::StartMeasuring { attached: [true; CHANNEL_COUNT] },
            HubCommand::StopMeasuring,
            HubCommand::RequestBattery,
            HubCommand::RequestMissingData { sequence: 0xDEADBEEF },
            HubCommand::RenameDevice { name: "Hub 2".to_string() },
            HubCommand::RequestConnectivityInfo,
            HubCommand::DeleteAllPairings,
            HubCommand::DeletePairing { slot: 4 },
            HubCommand::PowerOffHub,
            HubCommand::PowerOffSensor { address: addr() },
            HubCommand::SetLed { address: addr(), state: LedState::Steady },
        ];
        for cmd in commands {
            let (id, payload) = decode(&cmd.to_frame()).unwrap();
            assert_eq!(id, cmd.id());
            assert_eq!(payload, cmd.payload());
        }
    }
}
