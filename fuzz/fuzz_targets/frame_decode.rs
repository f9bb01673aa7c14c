//! Fuzz target for the incremental frame decoder.
//!
//! Feeds arbitrary byte streams through the decoder in both serialization
//! modes to find:
//! - Parser crashes or panics
//! - Integer overflows in length handling
//! - States the decoder cannot resynchronize out of
//!
//! The decoder should NEVER panic. Corrupt input costs an error and a
//! resync, nothing more.

#![no_main]

use apiary_proto::{FrameDecoder, OperatingMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for mode in [OperatingMode::Api, OperatingMode::ApiEscape] {
        let mut decoder = FrameDecoder::new(mode);
        for &byte in data {
            // Errors are expected; panics are bugs.
            let _ = decoder.decode(byte);
        }
    }
});
