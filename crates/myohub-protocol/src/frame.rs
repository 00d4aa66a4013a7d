//! Wire frame encoding and decoding
//!
//! One frame is ASCII-hex text:
//! `"80AA"` start marker, 4-hex-digit big-endian length (byte count of
//! command + payload), 2-hex-digit command, variable payload, 4-hex-digit
//! checksum, `"BB81"` end marker. The checksum is the 16-bit truncation of
//! `length + (command‖payload interpreted as one big base-16 integer)`;
//! only the trailing four hex digits of command‖payload survive the
//! truncation, so that is all we read. The decode path does not re-validate
//! the checksum, matching observed hub behavior.

use myohub_core::{MyoError, MyoResult};

/// Start-of-frame marker
pub const STX: &str = "80AA";
/// End-of-frame marker
pub const ETX: &str = "BB81";

/// Shortest input decode will even look at, in hex characters
pub const MIN_FRAME_CHARS: usize = 17;

const MARKER_CHARS: usize = 4;
const LENGTH_CHARS: usize = 4;
const COMMAND_CHARS: usize = 2;
const CHECKSUM_CHARS: usize = 4;

/// 16-bit checksum over the length field and command‖payload hex text
fn checksum(length: u16, cmd_payload: &str) -> u16 {
    let tail_start = cmd_payload.len().saturating_sub(4);
    let tail = u16::from_str_radix(&cmd_payload[tail_start..], 16).unwrap_or(0);
    length.wrapping_add(tail)
}

/// Encode a command byte and payload hex text into one wire frame
pub fn encode(command: u8, payload: &str) -> String {
    let cmd_payload = format!("{:02X}{}", command, payload);
    let length = (cmd_payload.len() / 2) as u16;
    format!(
        "{}{:04X}{}{:04X}{}",
        STX,
        length,
        cmd_payload,
        checksum(length, &cmd_payload),
        ETX
    )
}

/// Decode a wire frame into its command byte and payload hex text
pub fn decode(wire: &str) -> MyoResult<(u8, String)> {
    if !wire.is_ascii() {
        return Err(MyoError::BadHexDigit { field: "frame" });
    }
    if wire.len() < MIN_FRAME_CHARS {
        return Err(MyoError::FrameTooShort {
            len: wire.len(),
            min: MIN_FRAME_CHARS,
        });
    }

    let trailer = CHECKSUM_CHARS + MARKER_CHARS;
    let stx = &wire[..MARKER_CHARS];
    let etx = &wire[wire.len() - MARKER_CHARS..];
    if !stx.eq_ignore_ascii_case(STX) {
        return Err(MyoError::BadFrameMarker { position: "start" });
    }
    if !etx.eq_ignore_ascii_case(ETX) {
        return Err(MyoError::BadFrameMarker { position: "end" });
    }

    let length_field = &wire[MARKER_CHARS..MARKER_CHARS + LENGTH_CHARS];
    let declared = u16::from_str_radix(length_field, 16)
        .map_err(|_| MyoError::BadHexDigit { field: "length" })? as usize;

    let data = &wire[MARKER_CHARS + LENGTH_CHARS..wire.len() - trailer];
    if data.len() < COMMAND_CHARS {
        return Err(MyoError::FrameTooShort {
            len: wire.len(),
            min: MIN_FRAME_CHARS + 1,
        });
    }

    let actual = data.len() / 2;
    if declared != actual {
        return Err(MyoError::LengthMismatch { declared, actual });
    }

    let command = u8::from_str_radix(&data[..COMMAND_CHARS], 16)
        .map_err(|_| MyoError::BadHexDigit { field: "command" })?;
    Ok((command, data[COMMAND_CHARS..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let wire = encode(0x54, "00");
        // length of command + payload is 2 bytes
        assert!(wire.starts_with("80AA0002" ));
        assert!(wire.ends_with("BB81"));
        assert!(wire.contains("5400"));
    }

    #[test]
    fn test_known_checksum() {
        // length 2, trailing digits of "5400" = 0x5400
        let wire = encode(0x54, "00");
        let checksum_field = &wire[wire.len() - 8..wire.len() - 4];
        assert_eq!(checksum_field, "5402");
    }

    #[test]
    fn test_round_trip() {
        let (command, payload) = decode(&encode(0xA0, "0000002A1234")).unwrap();
        assert_eq!(command, 0xA0);
        assert_eq!(payload, "0000002A1234");
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let (command, payload) = decode(&encode(0x53, "00")).unwrap();
        assert_eq!(command, 0x53);
        assert_eq!(payload, "00");
    }

    #[test]
    fn test_rejects_short_input() {
        assert_eq!(
            decode("80AABB81"),
            Err(MyoError::FrameTooShort { len: 8, min: MIN_FRAME_CHARS })
        );
    }

    #[test]
    fn test_rejects_bad_markers() {
        let mut wire = encode(0x54, "00");
        wire.replace_range(0..4, "FFFF");
        assert_eq!(decode(&wire), Err(MyoError::BadFrameMarker { position: "start" }));

        let mut wire = encode(0x54, "00");
        let tail = wire.len() - 4..wire.len();
        wire.replace_range(tail, "FFFF");
        assert_eq!(decode(&wire), Err(MyoError::BadFrameMarker { position: "end" }));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut wire = encode(0x54, "00");
        wire.replace_range(4..8, "0005");
        assert_eq!(decode(&wire), Err(MyoError::LengthMismatch { declared: 5, actual: 2 }));
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        let wire = encode(0xA3, "AABBCC0011220300AA").to_ascii_lowercase();
        let (command, payload) = decode(&wire).unwrap();
        assert_eq!(command, 0xA3);
        assert_eq!(payload.to_ascii_uppercase(), "AABBCC0011220300AA");
    }

    #[test]
    fn test_checksum_not_verified_on_decode() {
        let mut wire = encode(0x54, "00");
        let range = wire.len() - 8..wire.len() - 4;
        wire.replace_range(range, "0000");
        assert!(decode(&wire).is_ok());
    }
}
