//! Fuzz target for packet parsing.
//!
//! Arbitrary payloads must either parse into a typed packet, come back as
//! an Unknown packet, or fail with MalformedPacket — never panic.

#![no_main]

use apiary_proto::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Packet::parse(data);
});
