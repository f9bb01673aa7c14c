//! Property-based tests for the frame codec.
//!
//! These verify the framing discipline for ALL inputs, not just specific
//! examples: checksum complement, escape reversibility, and encode/decode
//! round-trips in both serialization modes.

use apiary_proto::{codec, FrameDecoder, OperatingMode};
use proptest::prelude::*;

/// Strategy for non-empty payloads within the protocol maximum.
fn arbitrary_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..512)
}

fn decode_stream(mode: OperatingMode, stream: &[u8]) -> Vec<Vec<u8>> {
    let mut decoder = FrameDecoder::new(mode);
    let mut frames = Vec::new();
    for &byte in stream {
        if let Ok(Some(frame)) = decoder.decode(byte) {
            frames.push(frame.to_vec());
        }
    }
    frames
}

#[test]
fn prop_checksum_complements_sum() {
    proptest!(|(payload in arbitrary_payload())| {
        let cksum = codec::checksum(&payload);
        let sum = payload
            .iter()
            .fold(cksum, |acc, byte| acc.wrapping_add(*byte));

        // PROPERTY: (sum of payload + checksum) mod 256 == 0xFF
        prop_assert_eq!(sum, 0xFF);
        prop_assert!(codec::verify_checksum(&payload, cksum));
    });
}

#[test]
fn prop_escape_unescape_roundtrip() {
    proptest!(|(data in prop::collection::vec(any::<u8>(), 0..512))| {
        let escaped = codec::escape(&data);

        // PROPERTY: unescape(escape(B)) == B
        prop_assert_eq!(codec::unescape(&escaped).unwrap(), data);

        // PROPERTY: no reserved byte survives escaping unescorted
        let mut i = 0;
        while i < escaped.len() {
            if escaped[i] == 0x7D {
                i += 2; // escape pair
            } else {
                prop_assert!(!codec::needs_escape(escaped[i]));
                i += 1;
            }
        }
    });
}

#[test]
fn prop_encode_decode_roundtrip_plain() {
    proptest!(|(payload in arbitrary_payload())| {
        let wire = codec::encode_frame(&payload, OperatingMode::Api).unwrap();
        let frames = decode_stream(OperatingMode::Api, &wire);

        // PROPERTY: decode(encode(P)) == P
        prop_assert_eq!(frames, vec![payload]);
    });
}

#[test]
fn prop_encode_decode_roundtrip_escaped() {
    proptest!(|(payload in arbitrary_payload())| {
        let wire = codec::encode_frame(&payload, OperatingMode::ApiEscape).unwrap();

        // PROPERTY: after the delimiter no delimiter or flow-control byte
        // appears at all. Escaped halves are `b ^ 0x20`, which is never a
        // reserved value, so only the 0x7D introducer itself may survive.
        for (i, &byte) in wire.iter().enumerate().skip(1) {
            prop_assert!(
                !matches!(byte, 0x7E | 0x11 | 0x13),
                "raw reserved byte {byte:#04x} at offset {}", i
            );
        }

        let frames = decode_stream(OperatingMode::ApiEscape, &wire);
        prop_assert_eq!(frames, vec![payload]);
    });
}

#[test]
fn prop_decoder_survives_garbage_prefix() {
    proptest!(|(
        garbage in prop::collection::vec(any::<u8>().prop_filter("no delimiter", |b| *b != 0x7E), 0..64),
        payload in arbitrary_payload(),
    )| {
        let mut stream = garbage;
        let wire = codec::encode_frame(&payload, OperatingMode::Api).unwrap();
        stream.extend_from_slice(&wire);

        // PROPERTY: leading non-delimiter garbage never costs a frame
        let frames = decode_stream(OperatingMode::Api, &stream);
        prop_assert_eq!(frames, vec![payload]);
    });
}

#[test]
fn prop_back_to_back_frames_all_decode() {
    proptest!(|(payloads in prop::collection::vec(arbitrary_payload(), 1..8))| {
        for mode in [OperatingMode::Api, OperatingMode::ApiEscape] {
            let mut stream = Vec::new();
            for payload in &payloads {
                stream.extend_from_slice(&codec::encode_frame(payload, mode).unwrap());
            }

            // PROPERTY: frames are delivered complete and in order
            let frames = decode_stream(mode, &stream);
            prop_assert_eq!(&frames, &payloads);
        }
    });
}

/// Escaped transmit, checked byte for byte: frame id 0x7D and data bytes
/// 0x7E / 0x11 must all travel as escape pairs.
#[test]
fn escaped_transmit_wire_vector() {
    let payload = [
        0x10, 0x7D, // type, frame id
        0x00, 0x13, 0xA2, 0x00, 0x40, 0x01, 0x02, 0x03, // dest64
        0xFF, 0xFE, // dest16
        0x00, 0x00, // radius, options
        0x7E, 0x11, // data
    ];
    let wire = codec::encode_frame(&payload, OperatingMode::ApiEscape).unwrap();
    assert_eq!(
        &wire[..],
        &[
            0x7E, 0x00, 0x10, // delimiter, length 16
            0x10, 0x7D, 0x5D, // type, escaped frame id
            0x00, 0x7D, 0x33, 0xA2, 0x00, 0x40, 0x01, 0x02, 0x03, // dest64 (0x13 escaped)
            0xFF, 0xFE, // dest16
            0x00, 0x00, // radius, options
            0x7D, 0x5E, 0x7D, 0x31, // data: escaped 0x7E, 0x11
            0xEB, // checksum
        ]
    );
}
