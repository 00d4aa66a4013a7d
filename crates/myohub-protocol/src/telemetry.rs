//! Inbound telemetry decoding
//!
//! Dispatches decoded frames on their command byte into structured
//! events. Sample parsing is deliberately forgiving: a chunk that fails
//! to parse yields a zero sample, which the signal conditioner already
//! treats as a glitch, so transmission damage never aborts a batch.

use serde::{Deserialize, Serialize};

use myohub_core::{HardwareAddress, MyoError, MyoResult, CHANNEL_COUNT};

use crate::frame;

/// Sample batch: sequence number plus interleaved channel samples
pub const TEL_SAMPLE_BATCH: u8 = 0xA0;
/// Battery report: one code per channel plus one for the hub
pub const TEL_BATTERY_REPORT: u8 = 0xA1;
/// Discovery / attach report for one sensor
pub const TEL_DISCOVERY: u8 = 0xA3;
/// Connectivity change for one sensor
pub const TEL_CONNECTIVITY: u8 = 0xA5;
/// Acknowledgement of a previously issued command
pub const TEL_ACK: u8 = 0xE0;

/// Hex characters per sequence-number field
const SEQUENCE_CHARS: usize = 8;
/// Hex characters per sample (16-bit value)
const SAMPLE_CHARS: usize = 4;
/// Hex characters per sample frame (8 channels of 4 digits)
const SAMPLE_FRAME_CHARS: usize = SAMPLE_CHARS * CHANNEL_COUNT;
/// Trailing reserved byte on sample batches
const RESERVED_CHARS: usize = 2;

/// One decoded telemetry event from the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// A batch of raw samples, one array per sample frame in channel order
    SampleBatch {
        /// Packet sequence number for gap detection
        sequence: u32,
        /// Sample frames, each carrying one value per channel
        frames: Vec<[u16; CHANNEL_COUNT]>,
    },
    /// Battery codes for every channel slot plus the hub itself
    BatteryReport {
        /// Raw battery bytes in channel order
        clip_codes: Vec<u8>,
        /// Raw battery byte for the hub
        hub_code: u8,
    },
    /// A sensor reported itself during discovery or attach
    Discovery {
        address: HardwareAddress,
        /// Slot (channel) index the sensor is bound to
        slot: u8,
        /// Raw battery byte
        battery_code: u8,
    },
    /// A sensor's connectivity changed
    Connectivity {
        address: HardwareAddress,
        connected: bool,
    },
    /// Success/failure acknowledgement for an issued command
    Ack {
        /// Command byte being acknowledged
        command: u8,
        success: bool,
    },
}

/// Decode a complete wire frame into a telemetry event
pub fn decode_frame(wire: &str) -> MyoResult<TelemetryEvent> {
    let (command, payload) = frame::decode(wire)?;
    decode_event(command, &payload)
}

/// Dispatch a decoded (command, payload) pair into a telemetry event
pub fn decode_event(command: u8, payload: &str) -> MyoResult<TelemetryEvent> {
    match command {
        TEL_SAMPLE_BATCH => decode_sample_batch(payload),
        TEL_BATTERY_REPORT => decode_battery_report(payload),
        TEL_DISCOVERY => decode_discovery(payload),
        TEL_CONNECTIVITY => decode_connectivity(payload),
        TEL_ACK => decode_ack(payload),
        other => Err(MyoError::UnknownCommand { command: other }),
    }
}

fn require_len(command: u8, payload: &str, expected: usize) -> MyoResult<()> {
    if payload.len() < expected {
        Err(MyoError::TruncatedPayload {
            command,
            expected,
            actual: payload.len(),
        })
    } else {
        Ok(())
    }
}

fn decode_sample_batch(payload: &str) -> MyoResult<TelemetryEvent> {
    require_len(TEL_SAMPLE_BATCH, payload, SEQUENCE_CHARS + RESERVED_CHARS)?;

    let sequence = u32::from_str_radix(&payload[..SEQUENCE_CHARS], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "sequence" })?;

    let sample_region = &payload[SEQUENCE_CHARS..payload.len() - RESERVED_CHARS];
    let mut frames = Vec::with_capacity(sample_region.len() / SAMPLE_FRAME_CHARS);
    for chunk in sample_region.as_bytes().chunks(SAMPLE_FRAME_CHARS) {
        if chunk.len() < SAMPLE_FRAME_CHARS {
            // Incomplete trailing chunk: damaged in transit, drop it.
            break;
        }
        let mut samples = [0u16; CHANNEL_COUNT];
        for (channel, group) in chunk.chunks(SAMPLE_CHARS).enumerate() {
            // A damaged group becomes 0, which the conditioner rejects
            // as a glitch and replaces.
            samples[channel] = std::str::from_utf8(group)
                .ok()
                .and_then(|text| u16::from_str_radix(text, 16).ok())
                .unwrap_or(0);
        }
        frames.push(samples);
    }

    Ok(TelemetryEvent::SampleBatch { sequence, frames })
}

fn decode_battery_report(payload: &str) -> MyoResult<TelemetryEvent> {
    require_len(TEL_BATTERY_REPORT, payload, 2)?;

    let mut codes = Vec::with_capacity(payload.len() / 2);
    for group in payload.as_bytes().chunks(2) {
        if group.len() < 2 {
            break;
        }
        let code = std::str::from_utf8(group)
            .ok()
            .and_then(|text| u8::from_str_radix(text, 16).ok())
            .ok_or(MyoError::BadHexDigit { field: "battery code" })?;
        codes.push(code);
    }

    let hub_code = codes.pop().ok_or(MyoError::TruncatedPayload {
        command: TEL_BATTERY_REPORT,
        expected: 2,
        actual: payload.len(),
    })?;
    Ok(TelemetryEvent::BatteryReport { clip_codes: codes, hub_code })
}

fn decode_discovery(payload: &str) -> MyoResult<TelemetryEvent> {
    require_len(TEL_DISCOVERY, payload, 16)?;

    let address = HardwareAddress::parse(&payload[..12])?;
    let slot = u8::from_str_radix(&payload[12..14], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "slot" })?;
    let battery_code = u8::from_str_radix(&payload[14..16], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "battery code" })?;

    Ok(TelemetryEvent::Discovery { address, slot, battery_code })
}

fn decode_connectivity(payload: &str) -> MyoResult<TelemetryEvent> {
    require_len(TEL_CONNECTIVITY, payload, 14)?;

    let address = HardwareAddress::parse(&payload[..12])?;
    let status = u8::from_str_radix(&payload[12..14], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "connectivity status" })?;

    Ok(TelemetryEvent::Connectivity { address, connected: status == 0x01 })
}

fn decode_ack(payload: &str) -> MyoResult<TelemetryEvent> {
    require_len(TEL_ACK, payload, 4)?;

    let command = u8::from_str_radix(&payload[..2], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "acked command" })?;
    let status = u8::from_str_radix(&payload[2..4], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "ack status" })?;

    Ok(TelemetryEvent::Ack { command, success: status == 0x00 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CMD_STOP_MEASUREMENT;

    fn sample_frame_hex(values: [u16; CHANNEL_COUNT]) -> String {
        values.iter().map(|v| format!("{:04X}", v)).collect()
    }

    #[test]
    fn test_sample_batch_decoding() {
        let values = [100u16, 200, 300, 400, 500, 600, 700, 800];
        let payload = format!("0000002A{}{}00",
            sample_frame_hex(values),
            sample_frame_hex(values));
        let event = decode_event(TEL_SAMPLE_BATCH, &payload).unwrap();

        match event {
            TelemetryEvent::SampleBatch { sequence, frames } => {
                assert_eq!(sequence, 42);
                assert_eq!(frames.len(), 2);
                assert_eq!(frames[0], values);
                assert_eq!(frames[1], values);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_damaged_sample_group_becomes_zero() {
        let mut hex = sample_frame_hex([1000u16; CHANNEL_COUNT]);
        hex.replace_range(8..12, "XXXX"); // channel 2 damaged
        let payload = format!("00000001{}00", hex);
        let event = decode_event(TEL_SAMPLE_BATCH, &payload).unwrap();

        match event {
            TelemetryEvent::SampleBatch { frames, .. } => {
                assert_eq!(frames[0][2], 0);
                assert_eq!(frames[0][3], 1000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_battery_report_positions() {
        // 8 channel codes then one hub code
        let payload = "AA96AAAAAAAAAAAAB4";
        let event = decode_event(TEL_BATTERY_REPORT, payload).unwrap();
        match event {
            TelemetryEvent::BatteryReport { clip_codes, hub_code } => {
                assert_eq!(clip_codes.len(), 8);
                assert_eq!(clip_codes[1], 0x96);
                assert_eq!(hub_code, 0xB4);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_discovery_decoding() {
        let event = decode_event(TEL_DISCOVERY, "AABBCC00112203AA").unwrap();
        match event {
            TelemetryEvent::Discovery { address, slot, battery_code } => {
                assert_eq!(address.as_hex(), "AABBCC001122");
                assert_eq!(slot, 3);
                assert_eq!(battery_code, 0xAA);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_connectivity_decoding() {
        let connected = decode_event(TEL_CONNECTIVITY, "AABBCC00112201").unwrap();
        assert!(matches!(connected, TelemetryEvent::Connectivity { connected: true, .. }));

        let dropped = decode_event(TEL_CONNECTIVITY, "AABBCC00112200").unwrap();
        assert!(matches!(dropped, TelemetryEvent::Connectivity { connected: false, .. }));
    }

    #[test]
    fn test_ack_decoding() {
        let event = decode_event(TEL_ACK, "5300").unwrap();
        assert_eq!(event, TelemetryEvent::Ack { command: CMD_STOP_MEASUREMENT, success: true });

        let event = decode_event(TEL_ACK, "5301").unwrap();
        assert_eq!(event, TelemetryEvent::Ack { command: CMD_STOP_MEASUREMENT, success: false });
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert_eq!(
            decode_event(0x99, "00"),
            Err(MyoError::UnknownCommand { command: 0x99 })
        );
    }

    #[test]
    fn test_full_frame_decode() {
        let wire = frame::encode(TEL_ACK, "5300");
        let event = decode_frame(&wire).unwrap();
        assert!(matches!(event, TelemetryEvent::Ack { success: true, .. }));
    }
}
