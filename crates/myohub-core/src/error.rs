//! Error handling for the MyoHub subsystem
//!
//! Provides error types for framing, telemetry decoding and link
//! operations. Codec-level failures are local: a malformed frame is
//! logged and dropped, it never aborts the session.

use core::fmt;

/// Result type alias for MyoHub operations
pub type MyoResult<T> = Result<T, MyoError>;

/// Error type for all MyoHub operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MyoError {
    /// Wire input too short to contain a complete frame
    FrameTooShort {
        /// Actual character count
        len: usize,
        /// Minimum character count
        min: usize,
    },

    /// Start or end marker did not match the expected magic
    BadFrameMarker {
        /// Which marker failed ("start" or "end")
        position: &'static str,
    },

    /// Declared length field disagrees with the actual data region
    LengthMismatch {
        /// Byte count declared in the length field
        declared: usize,
        /// Byte count actually present
        actual: usize,
    },

    /// A field that must be hex digits failed to parse
    BadHexDigit {
        /// Field that failed to parse
        field: &'static str,
    },

    /// Telemetry frame carried a command id with no known decoding
    UnknownCommand {
        /// Command byte as received
        command: u8,
    },

    /// Telemetry payload shorter than the command requires
    TruncatedPayload {
        /// Command byte being decoded
        command: u8,
        /// Minimum payload character count
        expected: usize,
        /// Actual payload character count
        actual: usize,
    },

    /// Channel index outside the hub's slot range
    InvalidChannel {
        /// Requested channel index
        index: usize,
        /// Maximum valid index
        max: usize,
    },

    /// Hardware address failed validation
    InvalidAddress {
        /// Description of the address issue
        reason: &'static str,
    },

    /// Outbound write attempted before the link was established
    LinkNotReady,
}

impl fmt::Display for MyoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MyoError::FrameTooShort { len, min } => {
                write!(f, "Frame too short: {} chars, minimum {}", len, min)
            }
            MyoError::BadFrameMarker { position } => {
                write!(f, "Bad {} marker in frame", position)
            }
            MyoError::LengthMismatch { declared, actual } => {
                write!(f, "Frame length mismatch: declared {} bytes, actual {} bytes",
                       declared, actual)
            }
            MyoError::BadHexDigit { field } => {
                write!(f, "Invalid hex digits in {}", field)
            }
            MyoError::UnknownCommand { command } => {
                write!(f, "Unknown telemetry command 0x{:02X}", command)
            }
            MyoError::TruncatedPayload { command, expected, actual } => {
                write!(f, "Truncated payload for command 0x{:02X}: need {} chars, got {}",
                       command, expected, actual)
            }
            MyoError::InvalidChannel { index, max } => {
                write!(f, "Invalid channel index {}, maximum {}", index, max)
            }
            MyoError::InvalidAddress { reason } => {
                write!(f, "Invalid hardware address: {}", reason)
            }
            MyoError::LinkNotReady => {
                write!(f, "Link not ready for outbound writes")
            }
        }
    }
}

impl std::error::Error for MyoError {}
