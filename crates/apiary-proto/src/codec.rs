//! Byte-level frame codec.
//!
//! Layout on the wire:
//! `[0x7E] + [length: u16 BE] + [payload: length bytes] + [checksum: u8]`
//!
//! The checksum is `0xFF - (sum of payload bytes mod 256)`, so a received
//! frame verifies when `(sum of payload bytes + checksum) mod 256 == 0xFF`.
//!
//! In escaped mode (`AP = 2`) every byte after the start delimiter —
//! length, payload and checksum — that equals one of the four reserved
//! values is emitted as `0x7D, byte ^ 0x20`. The reserved values are the
//! delimiter itself, the escape byte and the XON/XOFF flow-control
//! characters, which a UART in software flow control would otherwise eat.
//!
//! # Invariants
//!
//! - [`FrameDecoder`] never yields a payload whose checksum did not verify.
//! - After any decode error the decoder has discarded the offending bytes
//!   and is re-seeking the next `0x7E`; feeding may continue.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    types::OperatingMode,
};

/// Start-of-frame delimiter.
pub const FRAME_DELIMITER: u8 = 0x7E;

/// Escape introducer in escaped mode.
pub const ESCAPE: u8 = 0x7D;

/// XON flow-control byte.
pub const XON: u8 = 0x11;

/// XOFF flow-control byte.
pub const XOFF: u8 = 0x13;

/// XOR applied to an escaped byte.
const ESCAPE_XOR: u8 = 0x20;

/// Maximum accepted payload length.
///
/// Real modules top out well below this; the cap guards allocation against
/// corrupt length fields.
pub const MAX_PAYLOAD_LEN: usize = 0x4000;

/// Whether a byte must be escaped in escaped mode.
#[must_use]
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, FRAME_DELIMITER | ESCAPE | XON | XOFF)
}

/// Frame checksum over a payload: `0xFF - (sum mod 256)`.
#[must_use]
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    0xFF_u8.wrapping_sub(sum)
}

/// Verify a received payload against its checksum byte.
#[must_use]
pub fn verify_checksum(payload: &[u8], carried: u8) -> bool {
    let sum = payload.iter().fold(carried, |acc, byte| acc.wrapping_add(*byte));
    sum == 0xFF
}

/// Escape every reserved byte of `data`.
///
/// This is the raw escaping discipline, applied by [`encode_frame`] to
/// everything after the start delimiter.
#[must_use]
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if needs_escape(byte) {
            out.push(ESCAPE);
            out.push(byte ^ ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Reverse [`escape`].
///
/// # Errors
///
/// - `ProtocolError::Truncated` if the data ends on a dangling escape byte.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        if byte == ESCAPE {
            let Some(&escaped) = iter.next() else {
                return Err(ProtocolError::Truncated { needed: 1 });
            };
            out.push(escaped ^ ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Encode a frame payload into its on-wire form.
///
/// # Errors
///
/// - `ProtocolError::InvalidArgument` if the payload is empty (a frame
///   must at least carry its type byte).
/// - `ProtocolError::PayloadTooLarge` if it exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode_frame(payload: &[u8], mode: OperatingMode) -> Result<Bytes> {
    if payload.is_empty() {
        return Err(ProtocolError::InvalidArgument("frame payload must not be empty"));
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let length = payload.len() as u16;
    let cksum = checksum(payload);

    let mut body = Vec::with_capacity(payload.len() + 3);
    body.extend_from_slice(&length.to_be_bytes());
    body.extend_from_slice(payload);
    body.push(cksum);

    let mut wire = BytesMut::with_capacity(body.len() + 1);
    wire.put_u8(FRAME_DELIMITER);
    if mode.is_escaped() {
        wire.put_slice(&escape(&body));
    } else {
        wire.put_slice(&body);
    }
    Ok(wire.freeze())
}

/// Decode the first complete frame from a byte slice.
///
/// One-shot convenience over [`FrameDecoder`] for tests and fuzzing; the
/// reader task uses the incremental decoder directly.
///
/// # Errors
///
/// Any [`FrameDecoder`] error, or `ProtocolError::Truncated` if the slice
/// ends before a complete frame was seen.
pub fn decode_frame(data: &[u8], mode: OperatingMode) -> Result<Bytes> {
    let mut decoder = FrameDecoder::new(mode);
    for &byte in data {
        if let Some(payload) = decoder.decode(byte)? {
            return Ok(payload);
        }
    }
    Err(ProtocolError::Truncated { needed: decoder.bytes_remaining() })
}

/// Decode progress through a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Discarding bytes until the next delimiter.
    SeekDelimiter,
    /// Expecting the high length byte.
    LengthHi,
    /// Expecting the low length byte.
    LengthLo,
    /// Accumulating payload bytes.
    Payload,
    /// Expecting the checksum byte.
    Checksum,
}

/// Reentrant, incremental frame decoder.
///
/// Feed bytes one at a time with [`decode`](Self::decode); a complete,
/// checksum-verified payload is returned as soon as its last byte arrives.
/// Errors leave the decoder resynchronizing on the next delimiter, so a
/// corrupt frame costs exactly the bytes up to and including the failure.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: OperatingMode,
    state: DecodeState,
    escape_pending: bool,
    length: usize,
    payload: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder for the given serialization mode.
    #[must_use]
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            mode,
            state: DecodeState::SeekDelimiter,
            escape_pending: false,
            length: 0,
            payload: BytesMut::new(),
        }
    }

    /// Serialization mode this decoder unescapes for.
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Switch serialization mode and drop any partial frame.
    pub fn set_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
        self.reset();
    }

    /// Discard any partial frame and re-seek the next delimiter.
    pub fn reset(&mut self) {
        self.state = DecodeState::SeekDelimiter;
        self.escape_pending = false;
        self.length = 0;
        self.payload.clear();
    }

    /// Minimum number of further bytes required to finish the frame in
    /// progress (1 when still seeking a delimiter).
    #[must_use]
    pub fn bytes_remaining(&self) -> usize {
        match self.state {
            DecodeState::SeekDelimiter => 1,
            DecodeState::LengthHi => 3, // length pair + checksum at minimum
            DecodeState::LengthLo => 2,
            DecodeState::Payload => self.length - self.payload.len() + 1,
            DecodeState::Checksum => 1,
        }
    }

    /// Consume one byte of the stream.
    ///
    /// Returns `Ok(Some(payload))` when this byte completed a verified
    /// frame, `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` on an oversized length field.
    /// - `ProtocolError::BadChecksum` when the frame fails verification.
    ///
    /// After an error the decoder is already reset; continuing to feed
    /// bytes resumes at the next delimiter.
    pub fn decode(&mut self, byte: u8) -> Result<Option<Bytes>> {
        if self.state == DecodeState::SeekDelimiter {
            if byte == FRAME_DELIMITER {
                self.reset();
                self.state = DecodeState::LengthHi;
            }
            return Ok(None);
        }

        // A raw delimiter mid-frame only occurs in escaped mode when the
        // previous frame was cut short: well-formed escaped frames escape
        // it. Restart on it rather than corrupting the new frame.
        if self.mode.is_escaped() && byte == FRAME_DELIMITER && !self.escape_pending {
            self.reset();
            self.state = DecodeState::LengthHi;
            return Ok(None);
        }

        let Some(byte) = self.unescaped(byte) else {
            return Ok(None); // escape introducer consumed, value follows
        };

        match self.state {
            DecodeState::SeekDelimiter => Ok(None),
            DecodeState::LengthHi => {
                self.length = usize::from(byte) << 8;
                self.state = DecodeState::LengthLo;
                Ok(None)
            },
            DecodeState::LengthLo => {
                self.length |= usize::from(byte);
                if self.length > MAX_PAYLOAD_LEN {
                    let size = self.length;
                    self.reset();
                    return Err(ProtocolError::PayloadTooLarge {
                        size,
                        max: MAX_PAYLOAD_LEN,
                    });
                }
                self.payload.reserve(self.length);
                // A declared length of zero skips straight to the checksum;
                // the empty payload is rejected by packet parsing, not here.
                self.state = if self.length == 0 {
                    DecodeState::Checksum
                } else {
                    DecodeState::Payload
                };
                Ok(None)
            },
            DecodeState::Payload => {
                self.payload.put_u8(byte);
                if self.payload.len() == self.length {
                    self.state = DecodeState::Checksum;
                }
                Ok(None)
            },
            DecodeState::Checksum => {
                let payload = self.payload.split().freeze();
                let computed = checksum(&payload);
                self.reset();
                if byte == computed {
                    Ok(Some(payload))
                } else {
                    Err(ProtocolError::BadChecksum { carried: byte, computed })
                }
            },
        }
    }

    /// Apply escaped-mode unescaping to one byte.
    ///
    /// Returns `None` when the byte was an escape introducer whose value
    /// byte has not arrived yet.
    fn unescaped(&mut self, byte: u8) -> Option<u8> {
        if !self.mode.is_escaped() {
            return Some(byte);
        }
        if self.escape_pending {
            self.escape_pending = false;
            return Some(byte ^ ESCAPE_XOR);
        }
        if byte == ESCAPE {
            self.escape_pending = true;
            return None;
        }
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, data: &[u8]) -> Vec<Result<Bytes>> {
        let mut out = Vec::new();
        for &byte in data {
            match decoder.decode(byte) {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => {},
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn checksum_known_vector() {
        // AT "NI" request, frame id 1: 08 01 4E 49 -> 5F
        assert_eq!(checksum(&[0x08, 0x01, 0x4E, 0x49]), 0x5F);
        assert!(verify_checksum(&[0x08, 0x01, 0x4E, 0x49], 0x5F));
    }

    #[test]
    fn encode_plain_known_vector() {
        let wire = encode_frame(&[0x08, 0x01, 0x4E, 0x49], OperatingMode::Api).unwrap();
        assert_eq!(&wire[..], &[0x7E, 0x00, 0x04, 0x08, 0x01, 0x4E, 0x49, 0x5F]);
    }

    #[test]
    fn encode_escaped_reserves() {
        // Payload containing all four reserved bytes.
        let payload = [0x92, 0x7E, 0x7D, 0x11, 0x13];
        let wire = encode_frame(&payload, OperatingMode::ApiEscape).unwrap();
        assert_eq!(wire[0], FRAME_DELIMITER);
        // 0x11 in the length low byte would also be escaped; here the
        // length is 5 so only payload bytes need it.
        assert_eq!(
            &wire[1..],
            &[
                0x00, 0x05, // length
                0x92, 0x7D, 0x5E, 0x7D, 0x5D, 0x7D, 0x31, 0x7D, 0x33, // escaped payload
                0x4E, // checksum: 0xFF - (0x92+0x7E+0x7D+0x11+0x13 mod 256)
            ]
        );
    }

    #[test]
    fn decoder_roundtrip_both_modes() {
        for mode in [OperatingMode::Api, OperatingMode::ApiEscape] {
            let payload = [0x10, 0x7D, 0x7E, 0x11, 0x13, 0x00, 0xFF];
            let wire = encode_frame(&payload, mode).unwrap();
            let mut decoder = FrameDecoder::new(mode);
            let frames = decode_all(&mut decoder, &wire);
            assert_eq!(frames.len(), 1);
            assert_eq!(&frames[0].clone().unwrap()[..], &payload[..]);
        }
    }

    #[test]
    fn decoder_resyncs_after_bad_checksum() {
        let good = encode_frame(&[0x8A, 0x00], OperatingMode::Api).unwrap();
        let mut corrupt = good.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;

        let mut stream = corrupt;
        stream.extend_from_slice(&good);

        let mut decoder = FrameDecoder::new(OperatingMode::Api);
        let results = decode_all(&mut decoder, &stream);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(ProtocolError::BadChecksum { .. })));
        assert_eq!(&results[1].clone().unwrap()[..], &[0x8A, 0x00]);
    }

    #[test]
    fn decoder_skips_leading_garbage() {
        let wire = encode_frame(&[0x8A, 0x06], OperatingMode::Api).unwrap();
        let mut stream = vec![0x00, 0x42, 0xFF];
        stream.extend_from_slice(&wire);

        let mut decoder = FrameDecoder::new(OperatingMode::Api);
        let results = decode_all(&mut decoder, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(&results[0].clone().unwrap()[..], &[0x8A, 0x06]);
    }

    #[test]
    fn plain_mode_payload_may_contain_delimiter() {
        let payload = [0x90, 0x7E, 0x7E, 0x7E];
        let wire = encode_frame(&payload, OperatingMode::Api).unwrap();
        let mut decoder = FrameDecoder::new(OperatingMode::Api);
        let results = decode_all(&mut decoder, &wire);
        assert_eq!(results.len(), 1);
        assert_eq!(&results[0].clone().unwrap()[..], &payload[..]);
    }

    #[test]
    fn escaped_mode_raw_delimiter_restarts_frame() {
        // Start a frame, cut it short with a new delimiter, then a full one.
        let full = encode_frame(&[0x8A, 0x02], OperatingMode::ApiEscape).unwrap();
        let mut stream = vec![0x7E, 0x00, 0x08, 0x01]; // partial frame
        stream.extend_from_slice(&full);

        let mut decoder = FrameDecoder::new(OperatingMode::ApiEscape);
        let results = decode_all(&mut decoder, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(&results[0].clone().unwrap()[..], &[0x8A, 0x02]);
    }

    #[test]
    fn zero_length_frame_yields_empty_payload() {
        // The checksum of an empty payload is 0xFF. Rejecting the empty
        // frame is the packet parser's job, not the codec's.
        let mut decoder = FrameDecoder::new(OperatingMode::Api);
        let results = decode_all(&mut decoder, &[0x7E, 0x00, 0x00, 0xFF]);
        assert_eq!(results.len(), 1);
        assert!(results[0].clone().unwrap().is_empty());
    }

    #[test]
    fn oversized_length_rejected_before_allocation() {
        let mut decoder = FrameDecoder::new(OperatingMode::Api);
        let results = decode_all(&mut decoder, &[0x7E, 0xFF, 0xFF]);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn one_shot_decode_reports_truncation() {
        let err = decode_frame(&[0x7E, 0x00, 0x04, 0x08], OperatingMode::Api).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { needed: 4 }));
    }

    #[test]
    fn empty_payload_not_encodable() {
        assert!(matches!(
            encode_frame(&[], OperatingMode::Api),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }
}
