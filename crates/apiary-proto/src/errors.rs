//! Error types for the wire layer.
//!
//! Framing failures (bad checksum, truncation) and packet parsing failures
//! (malformed payload for a known frame type) are kept in one enum because
//! callers handle them identically: discard the frame and resynchronize.

use thiserror::Error;

/// Convenience alias for wire-layer results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while framing, deframing or parsing packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame checksum did not verify.
    ///
    /// The check is `(sum of payload bytes + checksum) mod 256 == 0xFF`.
    #[error("checksum mismatch: frame carried {carried:#04x}, computed {computed:#04x}")]
    BadChecksum {
        /// Checksum byte carried by the frame.
        carried: u8,
        /// Checksum computed over the received payload.
        computed: u8,
    },

    /// The byte stream ended before the frame was complete.
    #[error("frame truncated: {needed} more byte(s) required")]
    Truncated {
        /// Minimum number of additional bytes required.
        needed: usize,
    },

    /// Declared payload length exceeds the protocol maximum.
    ///
    /// Guards allocation against corrupt or hostile length fields.
    #[error("declared payload length {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Length declared by the frame header.
        size: usize,
        /// Maximum accepted payload length.
        max: usize,
    },

    /// Payload bytes do not form a valid packet of the declared type.
    #[error("malformed packet (frame type {frame_type:#04x}): {reason}")]
    MalformedPacket {
        /// Frame type byte of the offending payload.
        frame_type: u8,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// Caller-supplied value is out of range for the wire format.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
